use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::Response;

use rawsy_core::{Actor, Role, UserId};

use crate::app::errors;

/// Authenticated caller for a request, derived from a verified token.
///
/// Handlers that take an `ActorContext` reject unauthenticated requests with
/// 401; public handlers simply don't ask for one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: Actor,
}

impl ActorContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn actor_id(&self) -> UserId {
        self.actor.id
    }

    pub fn role(&self) -> Role {
        self.actor.role
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ActorContext>()
            .copied()
            .ok_or_else(|| errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing bearer token"))
    }
}
