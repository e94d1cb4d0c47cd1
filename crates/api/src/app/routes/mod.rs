//! HTTP routes, one file per area.

use axum::{Router, routing::get};

pub mod common;
pub mod products;
pub mod support;
pub mod system;

/// Routes that may read an [`ActorContext`](crate::context::ActorContext).
///
/// Public handlers ignore it; protected handlers extract it and reject with
/// 401 when the request was unauthenticated.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/products", products::router())
        .nest("/support", support::router())
}
