//! Server-rendered visitor analytics dashboard.
//!
//! Pages are reachable as `/admin?path=<page>` and directly under their own
//! path. Authentication is applied by the router, see [`crate::auth::admin`].

pub mod cache;
pub mod home;
pub mod html;
pub mod page_view_activity;
pub mod shared;
pub mod visitor_activity;
pub mod visitor_paths;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use crate::storage::Store;
use cache::StatsCache;
use shared::{param, Params};

pub const PATH_HOME: &str = "/admin/home";
pub const PATH_VISITOR_ACTIVITY: &str = "/admin/visitor-activity";
pub const PATH_VISITOR_PATHS: &str = "/admin/visitor-paths";
pub const PATH_PAGE_VIEW_ACTIVITY: &str = "/admin/page-view-activity";

pub struct AdminState {
    pub store: Arc<Store>,
    pub cache: StatsCache,
    /// Target of the first breadcrumb.
    pub home_url: String,
    /// Site being tracked, shown on the home page when set.
    pub website_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    VisitorActivity,
    VisitorPaths,
    PageViewActivity,
}

impl Page {
    /// Page for a `?path=` value. Unknown values fall back to the home page.
    pub fn from_path(path: &str) -> Self {
        match path {
            PATH_VISITOR_ACTIVITY => Page::VisitorActivity,
            PATH_VISITOR_PATHS => Page::VisitorPaths,
            PATH_PAGE_VIEW_ACTIVITY => Page::PageViewActivity,
            _ => Page::Home,
        }
    }
}

async fn render(state: &AdminState, page: Page, params: &Params) -> Html<String> {
    let body = match page {
        Page::Home => home::render(state, params).await,
        Page::VisitorActivity => visitor_activity::render(state, params).await,
        Page::VisitorPaths => visitor_paths::render(state, params).await,
        Page::PageViewActivity => page_view_activity::render(state, params).await,
    };
    Html(body)
}

/// GET /admin?path=... - Dispatch to a dashboard page.
pub async fn dispatch(
    State(state): State<Arc<AdminState>>,
    Query(params): Query<Params>,
) -> Html<String> {
    let page = Page::from_path(param(&params, "path"));
    render(&state, page, &params).await
}

pub async fn home_page(
    State(state): State<Arc<AdminState>>,
    Query(params): Query<Params>,
) -> Html<String> {
    render(&state, Page::Home, &params).await
}

pub async fn visitor_activity_page(
    State(state): State<Arc<AdminState>>,
    Query(params): Query<Params>,
) -> Html<String> {
    render(&state, Page::VisitorActivity, &params).await
}

pub async fn visitor_paths_page(
    State(state): State<Arc<AdminState>>,
    Query(params): Query<Params>,
) -> Html<String> {
    render(&state, Page::VisitorPaths, &params).await
}

pub async fn page_view_activity_page(
    State(state): State<Arc<AdminState>>,
    Query(params): Query<Params>,
) -> Html<String> {
    render(&state, Page::PageViewActivity, &params).await
}

/// Dashboard routes, without authentication.
pub fn routes(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/admin", get(dispatch))
        .route(PATH_HOME, get(home_page))
        .route(PATH_VISITOR_ACTIVITY, get(visitor_activity_page))
        .route(PATH_VISITOR_PATHS, get(visitor_paths_page))
        .route(PATH_PAGE_VIEW_ACTIVITY, get(page_view_activity_page))
        .with_state(state)
}
