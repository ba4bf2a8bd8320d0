use crate::error::{AppError, AppResult, LoggedJson};
use crate::types::{BeaconPayload, VisitRequest};
use crate::visitor::{column_max_len, COLUMN_PATH};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use axum::{Extension, Json};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::visitor::Visitor;

pub struct IngestState {
    pub tx: mpsc::Sender<Visitor>,
    /// Lower-case name of the header carrying the visitor's country code.
    pub country_header: String,
}

impl IngestState {
    /// Hand a visit to the write-behind worker. Never blocks the request:
    /// when the channel is full the visit is dropped.
    pub fn enqueue(&self, request: &VisitRequest) {
        if self.tx.try_send(request.to_visitor()).is_err() {
            tracing::warn!(path = %request.path, "visit channel full, visit dropped");
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or("")
}

/// Client IP: first hop of `X-Forwarded-For`, then `X-Real-IP`, then the
/// socket peer. Header values that do not parse as an IP are ignored.
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    let forwarded = header_str(headers, "x-forwarded-for")
        .split(',')
        .next()
        .unwrap_or("")
        .trim();
    if forwarded.parse::<IpAddr>().is_ok() {
        return forwarded.to_string();
    }

    let real_ip = header_str(headers, "x-real-ip");
    if real_ip.parse::<IpAddr>().is_ok() {
        return real_ip.to_string();
    }

    remote.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// Collect everything a visit is recorded from.
pub fn visit_request_from_parts(
    headers: &HeaderMap,
    path: &str,
    remote: Option<SocketAddr>,
    country_header: &str,
) -> VisitRequest {
    VisitRequest {
        path: path.to_string(),
        ip_address: client_ip(headers, remote),
        user_agent: header_str(headers, header::USER_AGENT.as_str()).to_string(),
        referrer: header_str(headers, header::REFERER.as_str()).to_string(),
        accept_language: header_str(headers, header::ACCEPT_LANGUAGE.as_str()).to_string(),
        accept_encoding: header_str(headers, header::ACCEPT_ENCODING.as_str()).to_string(),
        country: header_str(headers, country_header).to_string(),
    }
}

/// Paths the tracking middleware records: GET requests outside the admin,
/// health and API surfaces.
pub fn should_track(method: &Method, path: &str) -> bool {
    method == Method::GET
        && !(path == "/admin"
            || path.starts_with("/admin/")
            || path == "/health"
            || path.starts_with("/v1/"))
}

/// Middleware recording every tracked request as a visit, then forwarding it.
pub async fn track_visits(
    State(state): State<Arc<IngestState>>,
    request: Request,
    next: Next,
) -> Response {
    if should_track(request.method(), request.uri().path()) {
        let remote = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let visit = visit_request_from_parts(
            request.headers(),
            request.uri().path(),
            remote,
            &state.country_header,
        );
        state.enqueue(&visit);
    }
    next.run(request).await
}

/// POST /v1/visits - Record a visit reported by the page itself.
pub async fn record_visit(
    State(state): State<Arc<IngestState>>,
    connect_info: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    LoggedJson(payload): LoggedJson<BeaconPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let path = payload.path.trim();
    if path.is_empty() {
        return Err(AppError::Validation("path is required".to_string()));
    }
    let max_path = column_max_len(COLUMN_PATH);
    if path.len() > max_path {
        return Err(AppError::Validation(format!(
            "path exceeds {max_path} bytes"
        )));
    }

    let remote = connect_info.map(|Extension(ConnectInfo(addr))| addr);
    let mut visit = visit_request_from_parts(&headers, path, remote, &state.country_header);
    if let Some(referrer) = payload.referrer {
        visit.referrer = referrer;
    }

    state.enqueue(&visit);
    Ok(Json(serde_json::json!({ "status": "accepted" })))
}
