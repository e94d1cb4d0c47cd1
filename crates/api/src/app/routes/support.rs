//! Support routes: FAQ management and admin broadcasts.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use serde_json::json;

use rawsy_auth::Permission;
use rawsy_core::error::require_text;
use rawsy_support::{CreateFaq, DeleteFaq, Faq, FaqCommand, FaqId, UpdateFaq};

use crate::app::dto::{BroadcastRequest, CreateFaqRequest, FaqResponse, UpdateFaqRequest};
use crate::app::errors;
use crate::app::extract::ApiJson;
use crate::app::routes::common::CmdAuth;
use crate::app::services::{AppServices, RealtimeMessage};
use crate::authz;
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/faq", get(list_faqs).post(create_faq))
        .route("/faq/:id", put(update_faq).delete(delete_faq))
        .route("/broadcast", post(broadcast))
}

fn parse_faq_id(raw: &str) -> Result<FaqId, Response> {
    raw.trim().parse().map_err(|_| errors::invalid_id("faq"))
}

fn dispatch_faq(services: &AppServices, actor: &ActorContext, cmd: CmdAuth<FaqCommand>, faq_id: FaqId) -> Result<(), Response> {
    authz::authorize_command(actor, &cmd).map_err(errors::authz_error_to_response)?;
    services
        .dispatch::<Faq>(faq_id.aggregate_id(), cmd.inner)
        .map(|_| ())
        .map_err(errors::dispatch_error_to_response)
}

fn faq_document(services: &AppServices, faq_id: FaqId, status: StatusCode) -> Response {
    match services.faq(faq_id) {
        Some(faq) => (status, Json(FaqResponse::from(&faq))).into_response(),
        None => errors::not_found(),
    }
}

/// GET /support/faq (public, creation order)
async fn list_faqs(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let faqs: Vec<FaqResponse> = services.faqs().iter().map(FaqResponse::from).collect();
    Json(faqs)
}

/// POST /support/faq
async fn create_faq(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    ApiJson(body): ApiJson<CreateFaqRequest>,
) -> Response {
    let faq_id = FaqId::generate();
    let cmd = CmdAuth::new(
        FaqCommand::CreateFaq(CreateFaq {
            faq_id,
            actor: actor.actor(),
            question: body.question,
            answer: body.answer,
            tags: body.tags,
            occurred_at: Utc::now(),
        }),
        Permission::SUPPORT_MANAGE,
    );
    match dispatch_faq(&services, &actor, cmd, faq_id) {
        Ok(()) => faq_document(&services, faq_id, StatusCode::CREATED),
        Err(resp) => resp,
    }
}

/// PUT /support/faq/:id
async fn update_faq(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateFaqRequest>,
) -> Response {
    let faq_id = match parse_faq_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        FaqCommand::UpdateFaq(UpdateFaq {
            faq_id,
            actor: actor.actor(),
            question: body.question,
            answer: body.answer,
            tags: body.tags,
            occurred_at: Utc::now(),
        }),
        Permission::SUPPORT_MANAGE,
    );
    match dispatch_faq(&services, &actor, cmd, faq_id) {
        Ok(()) => faq_document(&services, faq_id, StatusCode::OK),
        Err(resp) => resp,
    }
}

/// DELETE /support/faq/:id
async fn delete_faq(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    Path(id): Path<String>,
) -> Response {
    let faq_id = match parse_faq_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let cmd = CmdAuth::new(
        FaqCommand::DeleteFaq(DeleteFaq {
            faq_id,
            actor: actor.actor(),
            occurred_at: Utc::now(),
        }),
        Permission::SUPPORT_MANAGE,
    );
    match dispatch_faq(&services, &actor, cmd, faq_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}

/// POST /support/broadcast
///
/// Lossy push to currently connected realtime clients; answers with the
/// number of subscribers that received it.
async fn broadcast(
    Extension(services): Extension<Arc<AppServices>>,
    actor: ActorContext,
    ApiJson(body): ApiJson<BroadcastRequest>,
) -> Response {
    if let Err(e) = authz::require(&actor, &Permission::SUPPORT_MANAGE) {
        return errors::authz_error_to_response(e);
    }
    let (title, message) = match (require_text("title", &body.title), require_text("message", &body.message)) {
        (Ok(t), Ok(m)) => (t, m),
        (Err(e), _) | (_, Err(e)) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_argument", e.to_string());
        }
    };

    let delivered = services.broadcast(RealtimeMessage::broadcast(&title, &message, actor.actor_id(), Utc::now()));
    tracing::info!(actor_id = %actor.actor_id(), delivered, "support broadcast sent");

    (StatusCode::ACCEPTED, Json(json!({ "delivered": delivered }))).into_response()
}
