use chrono::Utc;

use crate::admin::html::{self, escape, Breadcrumb};
use crate::admin::shared::{admin_url, param, parse_filters, str_truncate, total_pages, Filters, Paging, Params};
use crate::admin::{AdminState, PATH_HOME, PATH_VISITOR_ACTIVITY};
use crate::error::AppResult;
use crate::query::builder::VisitorQueryOptions;
use crate::visitor::{Visitor, COLUMN_CREATED_AT};

/// Related visits are picked from this many most recent rows.
const RELATED_WINDOW: i64 = 50;
const RELATED_MAX: usize = 10;

struct ListData {
    visitors: Vec<Visitor>,
    paging: Paging,
    total_pages: i64,
    total_count: i64,
    filters: Filters,
}

async fn load_list(state: &AdminState, params: &Params) -> AppResult<ListData> {
    let paging = Paging::from_params(params);
    let filters = parse_filters(params, Utc::now());
    // Visitor activity filters on range, country and device only.
    let filters = Filters {
        path_contains: String::new(),
        path_exact: String::new(),
        browser: String::new(),
        ..filters
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

    Ok(ListData {
        visitors,
        paging,
        total_pages: total_pages(total_count, paging.per_page),
        total_count,
        filters,
    })
}

/// Visits from the same IP as `visitor` among `recent`, excluding the visit itself.
pub fn related_visits(visitor: &Visitor, recent: Vec<Visitor>) -> Vec<Visitor> {
    recent
        .into_iter()
        .filter(|other| other.id() != visitor.id() && other.ip_address() == visitor.ip_address())
        .take(RELATED_MAX)
        .collect()
}

fn detail_link(visitor: &Visitor) -> String {
    escape(&admin_url(
        PATH_VISITOR_ACTIVITY,
        &[("visitor_id", visitor.id().to_string())],
    ))
}

fn device_label(visitor: &Visitor) -> String {
    let device_type = if visitor.user_device_type().is_empty() {
        "unknown"
    } else {
        visitor.user_device_type()
    };
    format!(
        r#"<span class="badge" title="{}">{}</span>"#,
        escape(visitor.user_device()),
        escape(device_type)
    )
}

fn list_rows(visitors: &[Visitor]) -> Vec<Vec<String>> {
    visitors
        .iter()
        .map(|v| {
            vec![
                escape(v.created_at()),
                format!(r#"<a href="{}">{}</a>"#, detail_link(v), escape(v.ip_address())),
                escape(v.country()),
                device_label(v),
                escape(&format!("{} {}", v.user_browser(), v.user_browser_version())),
                escape(&format!("{} {}", v.user_os(), v.user_os_version())),
                escape(&str_truncate(v.path(), 60)),
                escape(&str_truncate(v.user_referrer(), 40)),
            ]
        })
        .collect()
}

const LIST_HEADERS: &[&str] = &[
    "Time", "IP address", "Country", "Device", "Browser", "OS", "Path", "Referrer",
];

fn render_list(data: &ListData) -> String {
    let mut body = html::filter_form(
        PATH_VISITOR_ACTIVITY,
        &[
            ("from", "From", data.filters.from.as_str()),
            ("to", "To", data.filters.to.as_str()),
            ("country", "Country (or empty)", data.filters.country.as_str()),
            ("device", "Device type", data.filters.device.as_str()),
        ],
    );

    let table = if data.visitors.is_empty() {
        html::alert_info("No visitors found")
    } else {
        html::table(LIST_HEADERS, &list_rows(&data.visitors))
    };
    let footer = format!(
        r#"<p class="muted">Page {} of {} ({} visits)</p>{}"#,
        data.paging.page,
        data.total_pages,
        data.total_count,
        html::pagination(
            PATH_VISITOR_ACTIVITY,
            &with_per_page(&data.filters, data.paging.per_page),
            data.paging.page,
            data.total_pages,
        )
    );
    body.push_str(&html::card("Visitor Activity", &format!("{table}{footer}")));
    body
}

fn with_per_page(filters: &Filters, per_page: i64) -> Vec<(&'static str, String)> {
    let mut pairs = filters.query_pairs();
    pairs.push(("per_page", per_page.to_string()));
    pairs
}

fn render_detail(visitor: &Visitor, related: &[Visitor]) -> String {
    let fields: Vec<Vec<String>> = visitor
        .data()
        .into_iter()
        .map(|(column, value)| vec![escape(column), escape(&value)])
        .collect();
    let mut body = html::card("Visit", &html::table(&["Field", "Value"], &fields));

    let related_html = if related.is_empty() {
        html::alert_info("No other recent visits from this IP address")
    } else {
        html::table(LIST_HEADERS, &list_rows(related))
    };
    body.push_str(&html::card("Related visits (same IP)", &related_html));
    body
}

async fn load_detail(state: &AdminState, visitor_id: &str) -> AppResult<Option<(Visitor, Vec<Visitor>)>> {
    let Some(visitor) = state.store.visitor_find_by_id(visitor_id).await? else {
        return Ok(None);
    };
    let recent = state
        .store
        .visitor_list(VisitorQueryOptions {
            limit: RELATED_WINDOW,
            order_by: Some(COLUMN_CREATED_AT.to_string()),
            sort_order: Some("DESC".to_string()),
            ..Default::default()
        })
        .await?;
    let related = related_visits(&visitor, recent);
    Ok(Some((visitor, related)))
}

pub async fn render(state: &AdminState, params: &Params) -> String {
    let mut crumbs = vec![
        Breadcrumb::new("Home", state.home_url.clone()),
        Breadcrumb::new("Visitor Analytics", admin_url(PATH_HOME, &[])),
        Breadcrumb::new("Visitor Activity", admin_url(PATH_VISITOR_ACTIVITY, &[])),
    ];

    let visitor_id = param(params, "visitor_id");
    let body = if !visitor_id.is_empty() {
        crumbs.push(Breadcrumb::new("Visit", ""));
        match load_detail(state, visitor_id).await {
            Ok(Some((visitor, related))) => render_detail(&visitor, &related),
            Ok(None) => html::alert_danger("Visitor not found"),
            Err(e) => html::alert_danger(&e.public_parts().1),
        }
    } else {
        match load_list(state, params).await {
            Ok(data) => render_list(&data),
            Err(e) => html::alert_danger(&e.public_parts().1),
        }
    };

    html::layout("Visitor Activity", &crumbs, &body)
}
