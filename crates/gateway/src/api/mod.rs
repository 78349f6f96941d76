pub mod auth;
pub mod chat;
pub mod messages;
pub mod proxy;
pub mod sessions;
pub mod sync;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;

use cb_domain::Error;

use crate::state::AppState;

/// Build the full API router.
///
/// Every route passes through the actor-resolution middleware, so handlers
/// can read the caller's [`cb_domain::ActorScope`] from request extensions.
///
/// `state` is needed to wire up the middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Chat page (frontend bootstrap payload)
        .route("/chat", get(chat::page))
        // Legacy single-turn chat
        .route("/api/chat", post(chat::store))
        .route("/api/chat/history", get(chat::history))
        // Session management
        .route("/api/chat/sessions", get(sessions::list))
        .route("/api/chat/sessions", post(sessions::create))
        .route("/api/chat/sessions/:id", put(sessions::rename))
        .route("/api/chat/sessions/:id", delete(sessions::remove))
        .route("/api/chat/sessions/:id/messages", get(sessions::show))
        // Turn reconciliation
        .route("/api/chat/save-messages", post(messages::save))
        .route("/api/chat/update-message", post(messages::update))
        .route("/api/chat/clear", post(messages::clear))
        .route("/api/chat/session/:session_id/clear", post(messages::clear_session))
        // Device sync
        .route("/api/chat/session/:session_id/messages", get(sync::read))
        .route("/api/chat/session/:session_id/messages", post(sync::write))
        .route("/api/chat/session/:session_id/messages/last", delete(sync::pop))
        // Upstream AI proxy
        .route("/api/ai/chat", post(proxy::chat))
        // Resolve the caller's scope on every route.
        .route_layer(middleware::from_fn_with_state(state, auth::resolve_actor))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error shaping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON error response in the standard `{success: false, error}` shape.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

/// 422 with a per-field error map, mirroring form-validation output.
pub(crate) fn validation_error(field: &str, message: &str) -> Response {
    let mut errors = serde_json::Map::new();
    errors.insert(field.to_owned(), serde_json::json!([message]));
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({
            "success": false,
            "error": "validation failed",
            "errors": errors,
        })),
    )
        .into_response()
}

/// Map a domain error onto the HTTP surface.
pub(crate) fn error_response(err: &Error) -> Response {
    match err {
        Error::NotFound(msg) => api_error(StatusCode::NOT_FOUND, msg.clone()),
        Error::Forbidden(msg) => api_error(StatusCode::FORBIDDEN, msg.clone()),
        Error::Validation { field, message } => validation_error(field, message),
        Error::Upstream { provider, message } => {
            api_error(StatusCode::BAD_GATEWAY, format!("{provider}: {message}"))
        }
        other => {
            tracing::error!(error = %other, "request failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}
