use chrono::{DateTime, Duration, Utc};

use crate::admin::html::{self, escape, Breadcrumb};
use crate::admin::shared::{admin_url, parse_filters, str_truncate, total_pages, Filters, Paging, Params};
use crate::admin::{AdminState, PATH_HOME, PATH_VISITOR_PATHS};
use crate::error::AppResult;
use crate::query::builder::VisitorQueryOptions;
use crate::storage::Store;
use crate::visitor::{format_datetime, Visitor, COLUMN_CREATED_AT};

/// Sessions cover visits of this many days.
const SESSION_DAYS: i64 = 31;
/// Upper bound on visits loaded for session grouping.
const SESSION_VISIT_LIMIT: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStep {
    pub time: String,
    pub path: String,
    pub referrer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Fingerprint, or the IP address for visits recorded without one.
    pub key: String,
    pub ip_address: String,
    pub steps: Vec<SessionStep>,
}

/// Group visits into sessions keyed by fingerprint (IP when the fingerprint
/// is empty). Sessions keep first-seen order, steps keep input order.
pub fn group_sessions(visits: &[Visitor]) -> Vec<Session> {
    let mut sessions: Vec<Session> = Vec::new();
    for visit in visits {
        let key = if visit.fingerprint().is_empty() {
            visit.ip_address()
        } else {
            visit.fingerprint()
        };
        let step = SessionStep {
            time: visit.created_at().to_string(),
            path: visit.path().to_string(),
            referrer: visit.user_referrer().to_string(),
        };
        match sessions.iter_mut().find(|s| s.key == key) {
            Some(session) => session.steps.push(step),
            None => sessions.push(Session {
                key: key.to_string(),
                ip_address: visit.ip_address().to_string(),
                steps: vec![step],
            }),
        }
    }
    sessions
}

struct PageData {
    visitors: Vec<Visitor>,
    paging: Paging,
    total_pages: i64,
    filters: Filters,
    sessions: Vec<Session>,
}

async fn load(state: &AdminState, params: &Params) -> AppResult<PageData> {
    let paging = Paging::from_params(params);
    let filters = Filters {
        browser: String::new(),
        ..parse_filters(params, Utc::now())
    };

    let options = filters.to_options(&paging);
    let visitors = state.store.visitor_list(options.clone()).await?;
    let total_count = state
        .store
        .visitor_count(VisitorQueryOptions {
            limit: 0,
            offset: 0,
            ..options
        })
        .await?;

    Ok(PageData {
        visitors,
        paging,
        total_pages: total_pages(total_count, paging.per_page),
        filters,
        sessions: recent_sessions(&state.store, Utc::now()).await?,
    })
}

/// Sessions from the newest `SESSION_VISIT_LIMIT` visits of the last
/// `SESSION_DAYS` days, steps in visit order.
async fn recent_sessions(store: &Store, now: DateTime<Utc>) -> AppResult<Vec<Session>> {
    let since = format_datetime(now - Duration::days(SESSION_DAYS));
    let mut recent = store
        .visitor_list(VisitorQueryOptions {
            created_at_gte: Some(since),
            order_by: Some(COLUMN_CREATED_AT.to_string()),
            sort_order: Some("DESC".to_string()),
            limit: SESSION_VISIT_LIMIT,
            ..Default::default()
        })
        .await?;
    recent.reverse();
    Ok(group_sessions(&recent))
}

fn paths_table(visitors: &[Visitor]) -> String {
    if visitors.is_empty() {
        return html::alert_info("No visits found");
    }
    let rows: Vec<Vec<String>> = visitors
        .iter()
        .map(|v| {
            vec![
                escape(v.created_at()),
                escape(&str_truncate(v.path(), 80)),
                escape(v.country()),
                escape(v.user_device_type()),
                escape(&str_truncate(v.user_referrer(), 40)),
            ]
        })
        .collect();
    html::table(&["Time", "Path", "Country", "Device", "Referrer"], &rows)
}

fn sessions_html(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return html::alert_info("No sessions in the last 31 days");
    }
    let mut out = String::new();
    for session in sessions {
        let steps: Vec<Vec<String>> = session
            .steps
            .iter()
            .map(|step| {
                vec![
                    escape(&step.time),
                    escape(&str_truncate(&step.path, 80)),
                    escape(&str_truncate(&step.referrer, 40)),
                ]
            })
            .collect();
        out.push_str(&format!(
            r#"<h3>{} <span class="badge">{} visits</span></h3>{}"#,
            escape(&session.ip_address),
            session.steps.len(),
            html::table(&["Time", "Path", "Referrer"], &steps)
        ));
    }
    out
}

fn render_page(data: &PageData) -> String {
    let mut body = html::filter_form(
        PATH_VISITOR_PATHS,
        &[
            ("from", "From", data.filters.from.as_str()),
            ("to", "To", data.filters.to.as_str()),
            ("country", "Country (or empty)", data.filters.country.as_str()),
            ("device", "Device type", data.filters.device.as_str()),
            ("path_contains", "Path contains", data.filters.path_contains.as_str()),
            ("path_exact", "Exact path", data.filters.path_exact.as_str()),
        ],
    );

    let mut pairs = data.filters.query_pairs();
    pairs.push(("per_page", data.paging.per_page.to_string()));
    let list = format!(
        "{}{}",
        paths_table(&data.visitors),
        html::pagination(PATH_VISITOR_PATHS, &pairs, data.paging.page, data.total_pages)
    );
    body.push_str(&html::card("Visited paths", &list));
    body.push_str(&html::card("Sessions", &sessions_html(&data.sessions)));
    body
}

pub async fn render(state: &AdminState, params: &Params) -> String {
    let body = match load(state, params).await {
        Ok(data) => render_page(&data),
        Err(e) => html::alert_danger(&e.public_parts().1),
    };

    html::layout(
        "Visitor Paths",
        &[
            Breadcrumb::new("Home", state.home_url.clone()),
            Breadcrumb::new("Visitor Analytics", admin_url(PATH_HOME, &[])),
            Breadcrumb::new("Visitor Paths", ""),
        ],
        &body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(fingerprint: &str, ip: &str, path: &str) -> Visitor {
        let mut v = Visitor::new();
        v.set_fingerprint(fingerprint)
            .set_ip_address(ip)
            .set_path(path);
        v
    }

    #[test]
    fn test_group_sessions_first_seen_order() {
        let visits = vec![
            visit("fp-b", "10.0.0.2", "/"),
            visit("fp-a", "10.0.0.1", "/"),
            visit("fp-b", "10.0.0.2", "/pricing"),
            visit("fp-a", "10.0.0.1", "/docs"),
            visit("fp-b", "10.0.0.2", "/signup"),
        ];
        let sessions = group_sessions(&visits);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].key, "fp-b");
        let paths: Vec<&str> = sessions[0].steps.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/pricing", "/signup"]);
        assert_eq!(sessions[1].key, "fp-a");
        assert_eq!(sessions[1].steps.len(), 2);
    }

    #[test]
    fn test_group_sessions_falls_back_to_ip() {
        let visits = vec![
            visit("", "10.0.0.9", "/a"),
            visit("", "10.0.0.9", "/b"),
            visit("", "10.0.0.8", "/c"),
        ];
        let sessions = group_sessions(&visits);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].key, "10.0.0.9");
        assert_eq!(sessions[0].steps.len(), 2);
    }

    #[test]
    fn test_group_sessions_empty() {
        assert!(group_sessions(&[]).is_empty());
    }

    async fn temp_store() -> Store {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let config = crate::config::DatabaseConfig {
            path: tmp.path().to_path_buf(),
            pool_size: 2,
            visitor_table_name: "stats_visitor".into(),
            automigrate: true,
            debug: false,
        };
        // Keep the file alive for the rest of the test.
        std::mem::forget(tmp);
        let pool = crate::storage::sqlite::create_pool(&config).unwrap();
        crate::storage::sqlite::init_pool(&pool).await.unwrap();
        Store::new(crate::storage::NewStoreOptions {
            visitor_table_name: config.visitor_table_name,
            pool,
            automigrate_enabled: true,
            debug_enabled: false,
        })
        .await
        .unwrap()
    }

    fn visit_at(fingerprint: &str, path: &str, at: DateTime<Utc>) -> Visitor {
        let mut v = visit(fingerprint, "10.0.0.1", path);
        v.set_created_at(format_datetime(at));
        v
    }

    #[tokio::test]
    async fn test_recent_sessions_keep_newest_visits() {
        let store = temp_store().await;
        let now = Utc::now();

        let mut rows: Vec<Visitor> = (0..SESSION_VISIT_LIMIT)
            .map(|_| visit_at("fp-old", "/old", now - Duration::days(10)))
            .collect();
        rows.push(visit_at("fp-new", "/first", now - Duration::minutes(2)));
        rows.push(visit_at("fp-new", "/second", now - Duration::minutes(1)));
        rows.push(visit_at("fp-stale", "/gone", now - Duration::days(SESSION_DAYS + 5)));
        store.visitor_create_batch(rows).await.unwrap();

        let sessions = recent_sessions(&store, now).await.unwrap();
        let total_steps: usize = sessions.iter().map(|s| s.steps.len()).sum();
        assert_eq!(total_steps as i64, SESSION_VISIT_LIMIT);
        assert!(sessions.iter().all(|s| s.key != "fp-stale"));

        let newest = sessions
            .iter()
            .find(|s| s.key == "fp-new")
            .expect("newest visits grouped");
        let paths: Vec<&str> = newest.steps.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["/first", "/second"]);
        // Oldest sessions come first.
        assert_eq!(sessions[0].key, "fp-old");
    }
}
