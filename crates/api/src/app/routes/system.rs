use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::app::services::{AppServices, realtime_sse_stream};
use crate::context::ActorContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(actor: ActorContext) -> impl IntoResponse {
    Json(json!({
        "actorId": actor.actor_id().to_string(),
        "role": actor.role().as_str(),
    }))
}

/// GET /stream
///
/// Server-sent events: committed domain events (one notification per event,
/// topic = event type) and admin broadcasts (topic `support.broadcast`).
/// Any authenticated actor may subscribe. Slow clients lose messages.
pub async fn stream(Extension(services): Extension<Arc<AppServices>>, actor: ActorContext) -> impl IntoResponse {
    tracing::debug!(actor_id = %actor.actor_id(), "realtime subscriber connected");
    realtime_sse_stream(&services)
}
