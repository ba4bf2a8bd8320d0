use chrono::NaiveDate;
use moka::sync::Cache;
use std::time::Duration;

/// Visit totals for one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyStats {
    pub total_visits: i64,
    pub unique_visits: i64,
}

/// Per-day stats for the dashboard home page, keyed on
/// `"{table}:{YYYY-MM-DD}"`. Entries expire after the configured TTL so
/// today's numbers keep moving.
pub struct StatsCache {
    inner: Cache<String, DailyStats>,
}

impl StatsCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(Duration::from_secs(ttl_secs))
                .max_capacity(512)
                .build(),
        }
    }

    pub fn cache_key(table: &str, date: NaiveDate) -> String {
        format!("{table}:{}", date.format("%Y-%m-%d"))
    }

    pub fn get(&self, key: &str) -> Option<DailyStats> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: String, value: DailyStats) {
        self.inner.insert(key, value);
    }
}
