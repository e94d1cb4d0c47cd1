use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use rawsy_auth::AuthzError;
use rawsy_infra::command_dispatcher::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        DispatchError::InvalidArgument(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_argument", msg),
        DispatchError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Deserialize(msg) => {
            tracing::error!(error = %msg, "stored event no longer deserializes");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Projection(e) => {
            tracing::error!(error = %e, "projection failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "projection_error", e.to_string())
        }
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", err.to_string())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_id(what: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}

pub fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", "not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawsy_infra::event_store::EventStoreError;

    #[test]
    fn dispatch_errors_map_to_statuses() {
        let cases = [
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (DispatchError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (DispatchError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (DispatchError::InvalidId("x".into()), StatusCode::BAD_REQUEST),
            (DispatchError::Conflict("x".into()), StatusCode::CONFLICT),
            (DispatchError::InvariantViolation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                DispatchError::Store(EventStoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(dispatch_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn concurrency_failures_surface_as_conflict() {
        let err: DispatchError = EventStoreError::Concurrency("stale".into()).into();
        assert_eq!(dispatch_error_to_response(err).status(), StatusCode::CONFLICT);
    }
}
