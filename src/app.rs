use crate::admin::cache::StatsCache;
use crate::admin::{self, AdminState};
use crate::auth::admin::{require_admin, AdminAuth};
use crate::config::AppConfig;
use crate::ingest::handler::{self, IngestState};
use crate::query::handler::{self as query_handler, QueryState};
use crate::storage::Store;
use crate::visitor::Visitor;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Beacon payloads are a path and a referrer.
const BEACON_BODY_LIMIT: usize = 8 * 1024;

/// Full application router. Visits recorded by the beacon and the tracking
/// middleware go to `tx`.
pub fn build_router(config: &AppConfig, store: Arc<Store>, tx: mpsc::Sender<Visitor>) -> Router {
    let admin_auth = Arc::new(AdminAuth::new(&config.admin.token));

    let ingest_state = Arc::new(IngestState {
        tx: tx.clone(),
        country_header: config.ingest.country_header.to_lowercase(),
    });

    let query_state = Arc::new(QueryState {
        store: store.clone(),
        channel_capacity: config.ingest.channel_capacity,
        channel_tx: tx,
    });

    let admin_state = Arc::new(AdminState {
        store,
        cache: StatsCache::new(config.admin.stats_cache_ttl_secs),
        home_url: config.admin.home_url.clone(),
        website_url: config.admin.website_url.clone(),
    });

    // ── Dashboard (admin token) ──
    let admin_routes = admin::routes(admin_state).layer(middleware::from_fn_with_state(
        admin_auth.clone(),
        require_admin,
    ));

    // ── Visitor API (admin token) ──
    let query_routes = Router::new()
        .route("/v1/visitors", get(query_handler::list_visitors))
        .route("/v1/visitors/count", get(query_handler::count_visitors))
        .route(
            "/v1/visitors/{id}",
            get(query_handler::get_visitor).delete(query_handler::delete_visitor),
        )
        .layer(middleware::from_fn_with_state(admin_auth, require_admin))
        .with_state(query_state.clone());

    // ── Health (public) ──
    let health_route = Router::new()
        .route("/health", get(query_handler::health))
        .with_state(query_state);

    // Rate limiter for the public beacon
    let governor_conf = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_millisecond(config.rate_limit.replenish_interval_ms)
        .burst_size(config.rate_limit.burst_size)
        .finish()
        .expect("failed to build rate limiter config");

    // CORS for the beacon: pages report from whatever origin serves them
    let beacon_cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([axum::http::Method::POST, axum::http::Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    // ── Beacon (public, rate-limited) ──
    let beacon_routes = Router::new()
        .route("/v1/visits", post(handler::record_visit))
        .layer(DefaultBodyLimit::max(BEACON_BODY_LIMIT))
        .layer(GovernorLayer::new(governor_conf))
        .layer(beacon_cors)
        .with_state(ingest_state.clone());

    Router::new()
        .merge(admin_routes)
        .merge(query_routes)
        .merge(health_route)
        .merge(beacon_routes)
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn_with_state(
            ingest_state,
            handler::track_visits,
        ))
}
