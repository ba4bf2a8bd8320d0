use chrono::Utc;

use crate::admin::html::{self, escape, Breadcrumb};
use crate::admin::shared::{admin_url, parse_filters, str_truncate, total_pages, Filters, Paging, Params};
use crate::admin::{AdminState, PATH_HOME, PATH_PAGE_VIEW_ACTIVITY, PATH_VISITOR_ACTIVITY};
use crate::error::AppResult;
use crate::query::builder::VisitorQueryOptions;
use crate::visitor::Visitor;

/// Keep visits whose browser contains `browser`, ignoring case. An empty
/// filter keeps everything.
pub fn filter_by_browser(visitors: Vec<Visitor>, browser: &str) -> Vec<Visitor> {
    if browser.is_empty() {
        return visitors;
    }
    let needle = browser.to_lowercase();
    visitors
        .into_iter()
        .filter(|v| v.user_browser().to_lowercase().contains(&needle))
        .collect()
}

struct PageData {
    visitors: Vec<Visitor>,
    paging: Paging,
    total_pages: i64,
    filters: Filters,
}

async fn load(state: &AdminState, params: &Params) -> AppResult<PageData> {
    let paging = Paging::from_params(params);
    let filters = Filters {
        path_contains: String::new(),
        path_exact: String::new(),
        ..parse_filters(params, Utc::now())
    };

    let options = filters.to_options(&paging);
    let visitors = state.store.visitor_list(options.clone()).await?;
    // The browser filter only narrows the fetched page, counts ignore it.
    let total_count = state
        .store
        .visitor_count(VisitorQueryOptions {
            limit: 0,
            offset: 0,
            ..options
        })
        .await?;

    Ok(PageData {
        visitors: filter_by_browser(visitors, &filters.browser),
        paging,
        total_pages: total_pages(total_count, paging.per_page),
        filters,
    })
}

fn render_page(data: &PageData) -> String {
    let mut body = html::filter_form(
        PATH_PAGE_VIEW_ACTIVITY,
        &[
            ("from", "From", data.filters.from.as_str()),
            ("to", "To", data.filters.to.as_str()),
            ("country", "Country (or empty)", data.filters.country.as_str()),
            ("device", "Device type", data.filters.device.as_str()),
            ("browser", "Browser", data.filters.browser.as_str()),
        ],
    );

    let table = if data.visitors.is_empty() {
        html::alert_info("No page views found")
    } else {
        let rows: Vec<Vec<String>> = data
            .visitors
            .iter()
            .map(|v| {
                let detail = admin_url(PATH_VISITOR_ACTIVITY, &[("visitor_id", v.id().to_string())]);
                vec![
                    format!(r#"<a href="{}">{}</a>"#, escape(&detail), escape(v.created_at())),
                    escape(&str_truncate(v.path(), 80)),
                    escape(v.ip_address()),
                    escape(v.country()),
                    escape(&format!("{} {}", v.user_browser(), v.user_browser_version())),
                    escape(v.user_device_type()),
                ]
            })
            .collect();
        html::table(&["Time", "Path", "IP address", "Country", "Browser", "Device"], &rows)
    };

    let mut pairs = data.filters.query_pairs();
    pairs.push(("per_page", data.paging.per_page.to_string()));
    body.push_str(&html::card(
        "Page Views",
        &format!(
            "{table}{}",
            html::pagination(PATH_PAGE_VIEW_ACTIVITY, &pairs, data.paging.page, data.total_pages)
        ),
    ));
    body
}

pub async fn render(state: &AdminState, params: &Params) -> String {
    let body = match load(state, params).await {
        Ok(data) => render_page(&data),
        Err(e) => html::alert_danger(&e.public_parts().1),
    };

    html::layout(
        "Page View Activity",
        &[
            Breadcrumb::new("Home", state.home_url.clone()),
            Breadcrumb::new("Visitor Analytics", admin_url(PATH_HOME, &[])),
            Breadcrumb::new("Page View Activity", ""),
        ],
        &body,
    )
}
