use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_visitor_table_name")]
    pub visitor_table_name: String,
    #[serde(default = "default_true")]
    pub automigrate: bool,
    #[serde(default)]
    pub debug: bool,
}

fn default_pool_size() -> usize {
    4
}

fn default_visitor_table_name() -> String {
    "stats_visitor".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_flush_batch_size")]
    pub flush_batch_size: usize,
    /// Request header carrying the ISO-2 country code set by a CDN or proxy.
    #[serde(default = "default_country_header")]
    pub country_header: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            flush_interval_secs: default_flush_interval(),
            flush_batch_size: default_flush_batch_size(),
            country_header: default_country_header(),
        }
    }
}

fn default_channel_capacity() -> usize {
    4096
}
fn default_flush_interval() -> u64 {
    2
}
fn default_flush_batch_size() -> usize {
    200
}
fn default_country_header() -> String {
    "cf-ipcountry".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    /// Soft-deleted rows older than this are removed for good. 0 disables pruning.
    #[serde(default = "default_soft_deleted_days")]
    pub soft_deleted_days: u64,
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            soft_deleted_days: default_soft_deleted_days(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

fn default_soft_deleted_days() -> u64 {
    30
}
fn default_prune_interval() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub token: String,
    #[serde(default = "default_home_url")]
    pub home_url: String,
    #[serde(default)]
    pub website_url: String,
    /// How long per-day dashboard counts are cached.
    #[serde(default = "default_stats_cache_ttl")]
    pub stats_cache_ttl_secs: u64,
}

fn default_home_url() -> String {
    "/".to_string()
}
fn default_stats_cache_ttl() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    /// Milliseconds to replenish one beacon request per client IP. 20 ms is
    /// a sustained 50 requests per second.
    pub replenish_interval_ms: u64,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            replenish_interval_ms: 20,
            burst_size: 100,
        }
    }
}

impl AppConfig {
    /// Validate configuration for security requirements.
    pub fn validate(&self) -> Result<(), String> {
        if self.admin.token.is_empty() || self.admin.token == "change-me-in-production" {
            return Err("admin.token must be set to a strong, unique value. \
                 Set it in config.toml or via STATSSTORE__ADMIN__TOKEN env var."
                .to_string());
        }
        if self.admin.token.len() < 16 {
            return Err("admin.token must be at least 16 characters.".to_string());
        }
        if !crate::storage::is_valid_identifier(&self.database.visitor_table_name) {
            return Err(format!(
                "database.visitor_table_name {:?} is not a plain SQL identifier",
                self.database.visitor_table_name
            ));
        }
        if self.rate_limit.replenish_interval_ms == 0 || self.rate_limit.burst_size == 0 {
            return Err(
                "rate_limit.replenish_interval_ms and rate_limit.burst_size must be positive"
                    .to_string(),
            );
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // STATSSTORE__SERVER__PORT=8080, STATSSTORE__ADMIN__TOKEN=..., etc.
        builder = builder.add_source(
            Environment::with_prefix("STATSSTORE")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            database: DatabaseConfig {
                path: "stats.db".into(),
                pool_size: 2,
                visitor_table_name: "stats_visitor".into(),
                automigrate: true,
                debug: false,
            },
            ingest: IngestConfig::default(),
            retention: RetentionConfig::default(),
            admin: AdminConfig {
                token: "0123456789abcdef0123".into(),
                home_url: "/".into(),
                website_url: String::new(),
                stats_cache_ttl_secs: 60,
            },
            rate_limit: RateLimitConfig::default(),
        }
    }

    #[test]
    fn accepts_sane_config() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn rejects_short_admin_token() {
        let mut cfg = sample();
        cfg.admin.token = "short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_table_name_with_sql() {
        let mut cfg = sample();
        cfg.database.visitor_table_name = "visitors; DROP TABLE x".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let mut cfg = sample();
        cfg.rate_limit.replenish_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = sample();
        cfg.rate_limit.burst_size = 0;
        assert!(cfg.validate().is_err());
    }
}
