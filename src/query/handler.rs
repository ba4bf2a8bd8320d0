use crate::error::{AppError, AppResult};
use crate::storage::Store;
use crate::types::{CountResponse, HealthResponse, VisitorQueryParams};
use crate::visitor::Visitor;
use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct QueryState {
    pub store: Arc<Store>,
    pub channel_capacity: usize,
    pub channel_tx: mpsc::Sender<Visitor>,
}

/// GET /v1/visitors - List visits matching the query string.
pub async fn list_visitors(
    State(state): State<Arc<QueryState>>,
    Query(params): Query<VisitorQueryParams>,
) -> AppResult<Json<Vec<Visitor>>> {
    let visitors = state.store.visitor_list(params.into_options()).await?;
    Ok(Json(visitors))
}

/// GET /v1/visitors/count - Count visits, or distinct values with `?distinct=`.
pub async fn count_visitors(
    State(state): State<Arc<QueryState>>,
    Query(params): Query<VisitorQueryParams>,
) -> AppResult<Json<CountResponse>> {
    let count = state.store.visitor_count(params.into_options()).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /v1/visitors/{id} - Single live visit.
pub async fn get_visitor(
    State(state): State<Arc<QueryState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Visitor>> {
    state
        .store
        .visitor_find_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("visitor {id}")))
}

/// DELETE /v1/visitors/{id} - Soft delete a visit.
pub async fn delete_visitor(
    State(state): State<Arc<QueryState>>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.store.visitor_soft_delete_by_id(&id).await?;
    tracing::info!(visitor_id = %id, "visitor soft deleted");
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

/// GET /health - Liveness plus how full the visit channel is.
pub async fn health(State(state): State<Arc<QueryState>>) -> Json<HealthResponse> {
    let db_ok = state.store.ping().await;

    // Approximate buffer usage from channel capacity
    let buffer_usage =
        1.0 - (state.channel_tx.capacity() as f64 / state.channel_capacity.max(1) as f64);

    Json(HealthResponse {
        status: if db_ok {
            "ok".into()
        } else {
            "degraded".into()
        },
        db_ok,
        buffer_usage,
    })
}
