//! Small HTML building blocks for the dashboard pages.
//!
//! Pages are plain server-rendered strings. Every value that comes from a
//! visitor row or the query string goes through [`escape`].

use crate::admin::shared::admin_url;

pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub struct Breadcrumb {
    pub name: String,
    pub url: String,
}

impl Breadcrumb {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Breadcrumb trail; the last entry is the current page and is not linked.
pub fn breadcrumbs(items: &[Breadcrumb]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut html = String::from(r#"<nav aria-label="breadcrumb"><ol class="breadcrumb">"#);
    for (i, item) in items.iter().enumerate() {
        if i == items.len() - 1 {
            html.push_str(&format!(
                r#"<li class="breadcrumb-item active" aria-current="page">{}</li>"#,
                escape(&item.name)
            ));
        } else {
            html.push_str(&format!(
                r#"<li class="breadcrumb-item"><a href="{}">{}</a></li>"#,
                escape(&item.url),
                escape(&item.name)
            ));
        }
    }
    html.push_str("</ol></nav>");
    html
}

pub fn alert_danger(message: &str) -> String {
    format!(
        r#"<div class="alert alert-danger" role="alert">{}</div>"#,
        escape(message)
    )
}

pub fn alert_info(message: &str) -> String {
    format!(r#"<div class="alert alert-info">{}</div>"#, escape(message))
}

/// Previous / numbered / next links. Numbered links cover a window of five
/// pages around the current one.
pub fn pagination(page_path: &str, pairs: &[(&str, String)], page: i64, total_pages: i64) -> String {
    if total_pages <= 1 {
        return String::new();
    }

    let link = |target: i64| {
        let mut all: Vec<(&str, String)> = pairs.to_vec();
        all.push(("page", target.to_string()));
        escape(&admin_url(page_path, &all))
    };

    let mut html = String::from(r#"<nav><ul class="pagination">"#);
    if page > 1 {
        html.push_str(&format!(
            r#"<li class="page-item"><a class="page-link" href="{}">&laquo; Prev</a></li>"#,
            link(page - 1)
        ));
    }

    let start = (page - 2).max(1);
    let end = (start + 4).min(total_pages);
    for target in start..=end {
        let active = if target == page { " active" } else { "" };
        html.push_str(&format!(
            r#"<li class="page-item{active}"><a class="page-link" href="{}">{target}</a></li>"#,
            link(target)
        ));
    }

    if page < total_pages {
        html.push_str(&format!(
            r#"<li class="page-item"><a class="page-link" href="{}">Next &raquo;</a></li>"#,
            link(page + 1)
        ));
    }
    html.push_str("</ul></nav>");
    html
}

/// Table with escaped header cells. Row cells are inserted as-is, callers
/// escape them.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut html = String::from(r#"<table class="table"><thead><tr>"#);
    for header in headers {
        html.push_str(&format!("<th>{}</th>", escape(header)));
    }
    html.push_str("</tr></thead><tbody>");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{cell}</td>"));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

pub fn card(title: &str, body: &str) -> String {
    format!(
        r#"<div class="card"><div class="card-header">{}</div><div class="card-body">{body}</div></div>"#,
        escape(title)
    )
}

const STYLE: &str = "
body { font-family: system-ui, sans-serif; margin: 0; background: #f5f6f8; color: #212529; }
header { background: #212529; color: #fff; padding: 12px 24px; }
header a { color: #fff; margin-right: 16px; text-decoration: none; }
main { padding: 24px; }
.breadcrumb { list-style: none; display: flex; gap: 8px; padding: 0; }
.breadcrumb-item + .breadcrumb-item::before { content: '/'; margin-right: 8px; color: #6c757d; }
.card { background: #fff; border: 1px solid #dee2e6; border-radius: 6px; margin-bottom: 24px; }
.card-header { padding: 12px 16px; border-bottom: 1px solid #dee2e6; font-weight: 600; }
.card-body { padding: 16px; }
.stats { display: flex; gap: 16px; flex-wrap: wrap; }
.stat { flex: 1; min-width: 160px; }
.stat .value { font-size: 1.8em; font-weight: 700; }
.table { width: 100%; border-collapse: collapse; }
.table th, .table td { text-align: left; padding: 6px 8px; border-bottom: 1px solid #dee2e6; vertical-align: top; }
.pagination { list-style: none; display: flex; gap: 4px; padding: 0; }
.page-link { display: block; padding: 4px 10px; border: 1px solid #dee2e6; border-radius: 4px; text-decoration: none; }
.page-item.active .page-link { background: #0d6efd; color: #fff; }
.alert { padding: 12px 16px; border-radius: 6px; margin-bottom: 16px; }
.alert-danger { background: #f8d7da; color: #842029; }
.alert-info { background: #cff4fc; color: #055160; }
.filters { display: flex; gap: 8px; flex-wrap: wrap; margin-bottom: 16px; }
.badge { display: inline-block; padding: 2px 6px; border-radius: 4px; background: #e9ecef; font-size: 0.85em; }
.muted { color: #6c757d; }
";

/// Full page with navigation, breadcrumbs and `body`.
pub fn layout(title: &str, crumbs: &[Breadcrumb], body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | Visitor Analytics</title>
<style>{STYLE}</style>
</head>
<body>
<header>
<a href="{home}">Dashboard</a>
<a href="{activity}">Visitor Activity</a>
<a href="{paths}">Visitor Paths</a>
<a href="{page_views}">Page View Activity</a>
</header>
<main>
{crumbs}
<h1>{title}</h1>
{body}
</main>
</body>
</html>"#,
        title = escape(title),
        home = escape(&admin_url(super::PATH_HOME, &[])),
        activity = escape(&admin_url(super::PATH_VISITOR_ACTIVITY, &[])),
        paths = escape(&admin_url(super::PATH_VISITOR_PATHS, &[])),
        page_views = escape(&admin_url(super::PATH_PAGE_VIEW_ACTIVITY, &[])),
        crumbs = breadcrumbs(crumbs),
    )
}

/// GET form that re-submits to the same dashboard page. `fields` are
/// `(name, label, current value)` text inputs shown after the range picker.
pub fn filter_form(page_path: &str, fields: &[(&str, &str, &str)]) -> String {
    let mut html = format!(
        r#"<form class="filters" method="get" action="/admin"><input type="hidden" name="path" value="{}">"#,
        escape(page_path)
    );
    html.push_str(
        r#"<select name="range"><option value="">Custom range</option><option value="24h">Last 24 hours</option><option value="today">Today</option><option value="7d">Last 7 days</option><option value="30d">Last 30 days</option></select>"#,
    );
    for (name, label, value) in fields {
        html.push_str(&format!(
            r#"<input type="text" name="{name}" placeholder="{}" value="{}">"#,
            escape(label),
            escape(value)
        ));
    }
    html.push_str(r#"<button type="submit">Filter</button></form>"#);
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>alert("x&y")</script>"#),
            "&lt;script&gt;alert(&quot;x&amp;y&quot;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_breadcrumbs_last_is_active() {
        let html = breadcrumbs(&[
            Breadcrumb::new("Home", "/"),
            Breadcrumb::new("Visitor Paths", "/admin"),
        ]);
        assert!(html.contains(r#"<a href="/">Home</a>"#));
        assert!(html.contains(r#"aria-current="page">Visitor Paths</li>"#));
    }

    #[test]
    fn test_pagination_window() {
        assert!(pagination("/admin/home", &[], 1, 1).is_empty());

        let html = pagination("/admin/visitor-activity", &[("country", "DE".into())], 5, 9);
        assert!(html.contains("Prev"));
        assert!(html.contains("Next"));
        assert!(html.contains("country=DE"));
        assert!(html.contains(r#"class="page-item active"><a class="page-link" href="/admin?path=%2Fadmin%2Fvisitor-activity&amp;country=DE&amp;page=5">5</a>"#));
        assert!(!html.contains(">2</a>"));
        assert!(html.contains(">7</a>"));
    }
}
