use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use rawsy_auth::JwtValidator;

use crate::app::errors;
use crate::context::ActorContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Attach an [`ActorContext`] when the request carries a valid bearer token.
///
/// Requests without an `Authorization` header pass through untouched so
/// public routes stay reachable; a present but invalid token is rejected.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    if !req.headers().contains_key(axum::http::header::AUTHORIZATION) {
        return Ok(next.run(req).await);
    }

    let unauthorized = |msg: &str| errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg);

    let token = extract_bearer(req.headers()).ok_or_else(|| unauthorized("malformed bearer token"))?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        debug!(error = %e, "rejected bearer token");
        unauthorized("invalid or expired token")
    })?;

    req.extensions_mut().insert(ActorContext::new(claims.actor()));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
