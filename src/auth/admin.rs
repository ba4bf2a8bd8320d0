use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::AppError;

pub const ADMIN_COOKIE: &str = "statsstore_admin";

/// Admin token check shared by the dashboard and the JSON API.
/// Only the SHA-256 of the configured token is kept in memory.
pub struct AdminAuth {
    token_hash: String,
}

impl AdminAuth {
    pub fn new(token: &str) -> Self {
        Self {
            token_hash: hash_token(token),
        }
    }

    /// Constant-time check of a plaintext token.
    pub fn verify_token(&self, plaintext: &str) -> bool {
        self.verify_hash(&hash_token(plaintext))
    }

    /// Constant-time check of a token hash, as stored in the admin cookie.
    fn verify_hash(&self, hash: &str) -> bool {
        self.token_hash.as_bytes().ct_eq(hash.as_bytes()).into()
    }
}

pub fn hash_token(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

fn extract_bearer(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn extract_query_token(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

fn admin_cookie(value: String) -> Cookie<'static> {
    Cookie::build((ADMIN_COOKIE, value))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}

fn unauthorized(request: &Request, message: &str) -> Response {
    if request.uri().path().starts_with("/admin") {
        (
            StatusCode::UNAUTHORIZED,
            Html(format!(
                "<!DOCTYPE html><html><head><title>Unauthorized</title></head>\
                 <body><h1>401 Unauthorized</h1><p>{message}</p></body></html>"
            )),
        )
            .into_response()
    } else {
        AppError::Auth(message.to_string()).into_response()
    }
}

/// Admin middleware. Accepts `Authorization: Bearer <token>`, the admin
/// cookie, or `?token=<token>`; the query form also sets the cookie so later
/// dashboard links work without it.
pub async fn require_admin(
    State(auth): State<Arc<AdminAuth>>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if let Some(token) = extract_bearer(&request) {
        if auth.verify_token(&token) {
            return Ok(next.run(request).await);
        }
        return Err(unauthorized(&request, "invalid admin token"));
    }

    let jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = jar.get(ADMIN_COOKIE) {
        if auth.verify_hash(cookie.value()) {
            return Ok(next.run(request).await);
        }
    }

    if let Some(token) = extract_query_token(&request) {
        if auth.verify_token(&token) {
            let jar = jar.add(admin_cookie(hash_token(&token)));
            let response = next.run(request).await;
            return Ok((jar, response).into_response());
        }
        tracing::warn!(path = %request.uri().path(), "rejected admin token from query string");
        return Err(unauthorized(&request, "invalid admin token"));
    }

    Err(unauthorized(&request, "admin authentication required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_token() {
        let auth = AdminAuth::new("0123456789abcdef");
        assert!(auth.verify_token("0123456789abcdef"));
        assert!(!auth.verify_token("0123456789abcdeF"));
        assert!(!auth.verify_token(""));
    }

    #[test]
    fn test_cookie_holds_hash_not_token() {
        let auth = AdminAuth::new("0123456789abcdef");
        let cookie = admin_cookie(hash_token("0123456789abcdef"));
        assert_ne!(cookie.value(), "0123456789abcdef");
        assert!(auth.verify_hash(cookie.value()));
        assert_eq!(cookie.http_only(), Some(true));
    }

    #[test]
    fn test_extract_query_token() {
        let request = Request::builder()
            .uri("/admin?path=%2Fadmin%2Fhome&token=s%20cret")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_query_token(&request).as_deref(), Some("s cret"));
    }

    fn guarded_router() -> axum::Router {
        let auth = Arc::new(AdminAuth::new("0123456789abcdef"));
        axum::Router::new()
            .route("/admin/home", axum::routing::get(|| async { "ok" }))
            .route("/v1/visitors", axum::routing::get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(auth, require_admin))
    }

    fn get(uri: &str, header: Option<(&str, String)>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(axum::body::Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_require_admin_paths() {
        use tower::ServiceExt;

        let resp = guarded_router()
            .oneshot(get("/v1/visitors", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = guarded_router()
            .oneshot(get(
                "/v1/visitors",
                Some(("authorization", "Bearer 0123456789abcdef".to_string())),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = guarded_router()
            .oneshot(get(
                "/admin/home",
                Some(("cookie", format!("{ADMIN_COOKIE}={}", hash_token("0123456789abcdef")))),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = guarded_router()
            .oneshot(get("/admin/home?token=0123456789abcdef", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let set_cookie = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with(ADMIN_COOKIE));

        let resp = guarded_router()
            .oneshot(get("/admin/home?token=wrong", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
    }
}
