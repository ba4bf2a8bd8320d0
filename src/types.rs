use serde::{Deserialize, Serialize};

use crate::query::builder::VisitorQueryOptions;
use crate::useragent::parse_user_agent;
use crate::visitor::{
    clip, column_max_len, Visitor, COLUMN_COUNTRY, COLUMN_IP_ADDRESS, COLUMN_PATH,
    COLUMN_USER_ACCEPT_ENCODING, COLUMN_USER_ACCEPT_LANGUAGE, COLUMN_USER_AGENT,
    COLUMN_USER_REFERRER,
};

/// Request details a visit is recorded from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitRequest {
    pub path: String,
    pub ip_address: String,
    pub user_agent: String,
    pub referrer: String,
    pub accept_language: String,
    pub accept_encoding: String,
    /// ISO-2 code as reported by the fronting proxy, upper-cased.
    pub country: String,
}

impl VisitRequest {
    /// Build a new visitor record with derived device, browser, OS and
    /// fingerprint fields. Values are clipped to their column sizes.
    pub fn to_visitor(&self) -> Visitor {
        let ua = parse_user_agent(&self.user_agent);
        let field = |value: &str, column: &str| clip(value.trim(), column_max_len(column));

        let mut visitor = Visitor::new();
        visitor
            .set_path(field(&self.path, COLUMN_PATH))
            .set_ip_address(field(&self.ip_address, COLUMN_IP_ADDRESS))
            .set_country(field(&self.country.to_ascii_uppercase(), COLUMN_COUNTRY))
            .set_user_agent(field(&self.user_agent, COLUMN_USER_AGENT))
            .set_user_referrer(field(&self.referrer, COLUMN_USER_REFERRER))
            .set_user_accept_language(field(&self.accept_language, COLUMN_USER_ACCEPT_LANGUAGE))
            .set_user_accept_encoding(field(&self.accept_encoding, COLUMN_USER_ACCEPT_ENCODING))
            .set_user_browser(ua.browser)
            .set_user_browser_version(ua.browser_version)
            .set_user_os(ua.os)
            .set_user_os_version(ua.os_version)
            .set_user_device(ua.device)
            .set_user_device_type(ua.device_type);
        let fingerprint = visitor.fingerprint_calculate();
        visitor.set_fingerprint(fingerprint);
        visitor
    }
}

/// Body of `POST /v1/visits`, sent by pages that are not served through
/// the tracking middleware.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeaconPayload {
    pub path: String,
    pub referrer: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub db_ok: bool,
    pub buffer_usage: f64,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// Query string of the visitor JSON API. `id_in` is a comma-separated list.
#[derive(Debug, Default, Deserialize)]
pub struct VisitorQueryParams {
    pub id_in: Option<String>,
    pub distinct: Option<String>,
    pub country: Option<String>,
    pub path_contains: Option<String>,
    pub path_exact: Option<String>,
    pub device_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Option<String>,
    pub sort_order: Option<String>,
    #[serde(default)]
    pub with_deleted: bool,
}

impl VisitorQueryParams {
    /// Default page is the 50 most recent visits; `limit` is capped at 500.
    pub fn into_options(self) -> VisitorQueryOptions {
        VisitorQueryOptions {
            id_in: self
                .id_in
                .map(|ids| {
                    ids.split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            distinct: self.distinct,
            country: self.country,
            path_contains: self.path_contains,
            path_exact: self.path_exact,
            device_type: self.device_type,
            created_at_gte: self.from,
            created_at_lte: self.to,
            limit: self.limit.unwrap_or(50).clamp(1, 500),
            offset: self.offset.unwrap_or(0).max(0),
            order_by: self.order_by.or_else(|| Some("created_at".to_string())),
            sort_order: self.sort_order,
            with_deleted: self.with_deleted,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_visitor_derives_fields() {
        let request = VisitRequest {
            path: "/pricing".into(),
            ip_address: "203.0.113.9".into(),
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1".into(),
            referrer: "https://search.example/".into(),
            accept_language: "en-GB,en;q=0.9".into(),
            accept_encoding: "gzip, br".into(),
            country: "gb".into(),
        };
        let visitor = request.to_visitor();
        assert_eq!(visitor.path(), "/pricing");
        assert_eq!(visitor.country(), "GB");
        assert_eq!(visitor.user_device_type(), "mobile");
        assert_eq!(visitor.user_browser(), "Safari");
        assert_eq!(visitor.fingerprint(), visitor.fingerprint_calculate());
        assert_eq!(visitor.fingerprint().len(), 32);
    }

    #[test]
    fn test_to_visitor_clips_long_values() {
        let request = VisitRequest {
            path: "/".repeat(600),
            country: "germany".into(),
            ..Default::default()
        };
        let visitor = request.to_visitor();
        assert_eq!(visitor.path().len(), 512);
        assert_eq!(visitor.country(), "GE");
    }

    #[test]
    fn test_query_params_into_options() {
        let params = VisitorQueryParams {
            id_in: Some("a, b".into()),
            limit: Some(10_000),
            offset: Some(-3),
            ..Default::default()
        };
        let options = params.into_options();
        assert_eq!(options.id_in, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(options.limit, 500);
        assert_eq!(options.offset, 0);
        assert_eq!(options.order_by.as_deref(), Some("created_at"));
    }
}
