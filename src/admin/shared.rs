use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;

use crate::query::builder::VisitorQueryOptions;
use crate::visitor::COLUMN_CREATED_AT;

/// Raw query string of an admin request.
pub type Params = HashMap<String, String>;

pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: i64 = 100;
/// Pages past this are clamped so offsets stay in range.
pub const MAX_PAGE: i64 = 1_000_000;

/// Trimmed query value, empty when absent.
pub fn param<'a>(params: &'a Params, key: &str) -> &'a str {
    params.get(key).map(|v| v.trim()).unwrap_or("")
}

/// Active list filters. `range` wins over explicit `from` / `to`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub range: String,
    pub from: String,
    pub to: String,
    pub country: String,
    pub device: String,
    pub path_contains: String,
    pub path_exact: String,
    pub browser: String,
}

impl Filters {
    /// Filters as query pairs, for links that keep the current selection.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        // A range is re-evaluated on every request, so links carry the range
        // rather than the bounds it produced.
        if !self.range.is_empty() {
            pairs.push(("range", self.range.clone()));
        } else {
            pairs.push(("from", self.from.clone()));
            pairs.push(("to", self.to.clone()));
        }
        pairs.push(("country", self.country.clone()));
        pairs.push(("device", self.device.clone()));
        pairs.push(("path_contains", self.path_contains.clone()));
        pairs.push(("path_exact", self.path_exact.clone()));
        pairs.push(("browser", self.browser.clone()));
        pairs.retain(|(_, v)| !v.is_empty());
        pairs
    }

    pub fn is_empty(&self) -> bool {
        self.query_pairs().is_empty()
    }

    /// Query options for a page of visits, newest first.
    pub fn to_options(&self, paging: &Paging) -> VisitorQueryOptions {
        VisitorQueryOptions {
            country: Some(self.country.clone()),
            created_at_gte: Some(self.from.clone()),
            created_at_lte: Some(self.to.clone()),
            device_type: Some(self.device.clone()),
            path_contains: Some(self.path_contains.clone()),
            path_exact: Some(self.path_exact.clone()),
            limit: paging.per_page,
            offset: paging.offset(),
            order_by: Some(COLUMN_CREATED_AT.to_string()),
            sort_order: Some("DESC".to_string()),
            ..Default::default()
        }
    }
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Read filters from the query string, resolving `range` against `now`.
pub fn parse_filters(params: &Params, now: DateTime<Utc>) -> Filters {
    let mut filters = Filters {
        range: param(params, "range").to_string(),
        from: param(params, "from").to_string(),
        to: param(params, "to").to_string(),
        country: param(params, "country").to_string(),
        device: param(params, "device").to_string(),
        path_contains: param(params, "path_contains").to_string(),
        path_exact: param(params, "path_exact").to_string(),
        browser: param(params, "browser").to_string(),
    };

    let bounds = match filters.range.to_lowercase().as_str() {
        "24h" | "last24hours" | "last_24_hours" => Some((now - Duration::hours(24), now)),
        "today" => {
            let start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
            Some((start, start + Duration::hours(24)))
        }
        "7d" | "last7days" => Some((now - Duration::days(7), now)),
        "30d" | "last30days" => Some((now - Duration::days(30), now)),
        _ => None,
    };
    if let Some((from, to)) = bounds {
        filters.from = rfc3339(from);
        filters.to = rfc3339(to);
    }

    filters
}

/// Positive integer from a query value, `default` otherwise.
pub fn parse_int_with_default(value: &str, default: i64) -> i64 {
    match value.trim().parse::<i64>() {
        Ok(parsed) if parsed > 0 => parsed,
        _ => default,
    }
}

pub fn clamp_per_page(per_page: i64) -> i64 {
    if per_page < 1 {
        DEFAULT_PER_PAGE
    } else {
        per_page.min(MAX_PER_PAGE)
    }
}

/// At least one page, even for an empty result.
pub fn total_pages(count: i64, per_page: i64) -> i64 {
    let per_page = per_page.max(1);
    ((count + per_page - 1) / per_page).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: i64,
    pub per_page: i64,
}

impl Paging {
    pub fn from_params(params: &Params) -> Self {
        Self {
            page: parse_int_with_default(param(params, "page"), 1).min(MAX_PAGE),
            per_page: clamp_per_page(parse_int_with_default(
                param(params, "per_page"),
                DEFAULT_PER_PAGE,
            )),
        }
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// Every date from `start` to `end`, both included. Empty when `start > end`.
pub fn dates_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|date| *date <= end)
        .collect()
}

/// Cut `value` to `max_chars` characters, marking the cut with `...`.
pub fn str_truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

/// `/admin?path=<page>&...` link, skipping empty values.
pub fn admin_url(page: &str, pairs: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("path", page);
    for (key, value) in pairs {
        if !value.is_empty() {
            serializer.append_pair(key, value);
        }
    }
    format!("/admin?{}", serializer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_filters_trims_values() {
        let p = params(&[("country", " DE "), ("device", "mobile"), ("from", "2024-01-01")]);
        let f = parse_filters(&p, at("2024-02-01T12:00:00Z"));
        assert_eq!(f.country, "DE");
        assert_eq!(f.device, "mobile");
        assert_eq!(f.from, "2024-01-01");
        assert_eq!(f.to, "");
    }

    #[test]
    fn test_range_overrides_from_and_to() {
        let now = at("2024-02-10T15:30:00Z");
        let p = params(&[("range", "7d"), ("from", "2020-01-01")]);
        let f = parse_filters(&p, now);
        assert_eq!(f.from, "2024-02-03T15:30:00Z");
        assert_eq!(f.to, "2024-02-10T15:30:00Z");

        let f = parse_filters(&params(&[("range", "Today")]), now);
        assert_eq!(f.from, "2024-02-10T00:00:00Z");
        assert_eq!(f.to, "2024-02-11T00:00:00Z");

        let f = parse_filters(&params(&[("range", "last_24_hours")]), now);
        assert_eq!(f.from, "2024-02-09T15:30:00Z");

        let f = parse_filters(&params(&[("range", "forever"), ("from", "x")]), now);
        assert_eq!(f.from, "x");
    }

    #[test]
    fn test_parse_int_with_default() {
        assert_eq!(parse_int_with_default("", 1), 1);
        assert_eq!(parse_int_with_default("3", 1), 3);
        assert_eq!(parse_int_with_default("0", 7), 7);
        assert_eq!(parse_int_with_default("-2", 7), 7);
        assert_eq!(parse_int_with_default("abc", 7), 7);
    }

    #[test]
    fn test_clamp_per_page_and_total_pages() {
        assert_eq!(clamp_per_page(0), 10);
        assert_eq!(clamp_per_page(50), 50);
        assert_eq!(clamp_per_page(1000), 100);
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
    }

    #[test]
    fn test_paging_huge_page_is_capped() {
        let paging = Paging::from_params(&params(&[
            ("page", "9223372036854775807"),
            ("per_page", "100"),
        ]));
        assert_eq!(paging.page, MAX_PAGE);
        assert_eq!(paging.offset(), (MAX_PAGE - 1) * 100);

        let paging = Paging::from_params(&params(&[("page", "3"), ("per_page", "20")]));
        assert_eq!(paging.offset(), 40);

        let raw = Paging {
            page: i64::MAX,
            per_page: MAX_PER_PAGE,
        };
        assert_eq!(raw.offset(), i64::MAX);
    }

    #[test]
    fn test_paging_from_params() {
        let paging = Paging::from_params(&params(&[("page", "3"), ("per_page", "500")]));
        assert_eq!(paging, Paging { page: 3, per_page: 100 });
        assert_eq!(paging.offset(), 200);
    }

    #[test]
    fn test_dates_in_range() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let dates: Vec<String> = dates_in_range(start, end)
            .iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(dates, vec!["2024-02-27", "2024-02-28", "2024-02-29", "2024-03-01"]);
        assert!(dates_in_range(end, start).is_empty());
    }

    #[test]
    fn test_str_truncate() {
        assert_eq!(str_truncate("short", 10), "short");
        assert_eq!(str_truncate("abcdef", 3), "abc...");
        assert_eq!(str_truncate("ñññññ", 2), "ññ...");
    }

    #[test]
    fn test_admin_url_encodes_and_skips_empty() {
        let url = admin_url(
            "/admin/visitor-paths",
            &[("page", "2".to_string()), ("country", String::new())],
        );
        assert_eq!(url, "/admin?path=%2Fadmin%2Fvisitor-paths&page=2");
    }
}
