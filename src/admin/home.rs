use chrono::{Duration, NaiveDate, Utc};

use crate::admin::cache::{DailyStats, StatsCache};
use crate::admin::html::{self, escape, Breadcrumb};
use crate::admin::shared::{dates_in_range, Params};
use crate::admin::{AdminState, PATH_PAGE_VIEW_ACTIVITY, PATH_VISITOR_ACTIVITY, PATH_VISITOR_PATHS};
use crate::error::AppResult;
use crate::query::builder::VisitorQueryOptions;
use crate::visitor::COLUMN_IP_ADDRESS;

/// Days shown on the dashboard, today included.
const DAYS: i64 = 31;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub total_visits: i64,
    pub unique_visits: i64,
    pub avg_total: f64,
    pub avg_unique: f64,
}

pub fn summarize(days: &[(NaiveDate, DailyStats)]) -> Summary {
    let total_visits: i64 = days.iter().map(|(_, s)| s.total_visits).sum();
    let unique_visits: i64 = days.iter().map(|(_, s)| s.unique_visits).sum();
    let n = days.len().max(1) as f64;
    Summary {
        total_visits,
        unique_visits,
        avg_total: total_visits as f64 / n,
        avg_unique: unique_visits as f64 / n,
    }
}

/// Total and unique (distinct IP) visits for one day.
async fn stats_for_day(state: &AdminState, date: NaiveDate) -> AppResult<DailyStats> {
    let key = StatsCache::cache_key(state.store.visitor_table_name(), date);
    if let Some(cached) = state.cache.get(&key) {
        return Ok(cached);
    }

    let day = date.format("%Y-%m-%d").to_string();
    let options = VisitorQueryOptions {
        created_at_gte: Some(format!("{day} 00:00:00")),
        created_at_lte: Some(format!("{day} 23:59:59")),
        ..Default::default()
    };

    let unique_visits = state
        .store
        .visitor_count(VisitorQueryOptions {
            distinct: Some(COLUMN_IP_ADDRESS.to_string()),
            ..options.clone()
        })
        .await?;
    let total_visits = state.store.visitor_count(options).await?;

    let stats = DailyStats {
        total_visits,
        unique_visits,
    };
    state.cache.insert(key, stats);
    Ok(stats)
}

pub async fn daily_stats(
    state: &AdminState,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<(NaiveDate, DailyStats)>> {
    let mut days = Vec::new();
    for date in dates_in_range(start, end) {
        days.push((date, stats_for_day(state, date).await?));
    }
    Ok(days)
}

fn nav_cards() -> String {
    let card = |title: &str, path: &str, text: &str| {
        format!(
            r#"<div class="card stat"><div class="card-body"><a href="{}"><strong>{}</strong></a><p class="muted">{}</p></div></div>"#,
            escape(&crate::admin::shared::admin_url(path, &[])),
            escape(title),
            escape(text)
        )
    };
    format!(
        r#"<div class="stats">{}{}{}</div>"#,
        card("Visitor Activity", PATH_VISITOR_ACTIVITY, "Track visitor interactions"),
        card("Visitor Paths", PATH_VISITOR_PATHS, "See how visitors move through the site"),
        card("Page View Activity", PATH_PAGE_VIEW_ACTIVITY, "Every page view, newest first"),
    )
}

fn summary_cards(summary: &Summary) -> String {
    let stat = |label: &str, value: String| {
        format!(
            r#"<div class="stat"><div class="muted">{}</div><div class="value">{}</div></div>"#,
            escape(label),
            escape(&value)
        )
    };
    format!(
        r#"<div class="stats">{}{}{}{}</div>"#,
        stat("Total visits", summary.total_visits.to_string()),
        stat("Unique visits", summary.unique_visits.to_string()),
        stat("Avg visits / day", format!("{:.1}", summary.avg_total)),
        stat("Avg unique / day", format!("{:.1}", summary.avg_unique)),
    )
}

fn stats_table(days: &[(NaiveDate, DailyStats)]) -> String {
    // Newest day first.
    let rows: Vec<Vec<String>> = days
        .iter()
        .rev()
        .map(|(date, stats)| {
            vec![
                date.format("%Y-%m-%d").to_string(),
                stats.unique_visits.to_string(),
                stats.total_visits.to_string(),
            ]
        })
        .collect();
    html::table(&["Date", "Unique visits", "Total visits"], &rows)
}

pub async fn render(state: &AdminState, _params: &Params) -> String {
    let end = Utc::now().date_naive();
    let start = end - Duration::days(DAYS - 1);

    let mut body = nav_cards();
    match daily_stats(state, start, end).await {
        Ok(days) => {
            let summary = summarize(&days);
            body.push_str(&html::card(
                &format!("Last {DAYS} days"),
                &summary_cards(&summary),
            ));
            body.push_str(&html::card("Daily visits", &stats_table(&days)));
        }
        Err(e) => {
            let (_, message) = e.public_parts();
            body.push_str(&html::alert_danger(&message));
        }
    }

    if !state.website_url.is_empty() {
        body.push_str(&format!(
            r#"<p class="muted">Tracking <a href="{0}">{0}</a></p>"#,
            escape(&state.website_url)
        ));
    }

    html::layout(
        "Dashboard",
        &[
            Breadcrumb::new("Home", state.home_url.clone()),
            Breadcrumb::new("Visitor Analytics", ""),
        ],
        &body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let days = vec![
            (d, DailyStats { total_visits: 10, unique_visits: 4 }),
            (d.succ_opt().unwrap(), DailyStats { total_visits: 0, unique_visits: 0 }),
        ];
        let summary = summarize(&days);
        assert_eq!(summary.total_visits, 10);
        assert_eq!(summary.unique_visits, 4);
        assert_eq!(summary.avg_total, 5.0);
        assert_eq!(summary.avg_unique, 2.0);
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize(&[]), Summary::default());
    }

    #[test]
    fn test_stats_table_newest_first() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let days = vec![
            (d, DailyStats::default()),
            (d.succ_opt().unwrap(), DailyStats::default()),
        ];
        let html = stats_table(&days);
        let first = html.find("2024-01-02").unwrap();
        let second = html.find("2024-01-01").unwrap();
        assert!(first < second);
    }
}
