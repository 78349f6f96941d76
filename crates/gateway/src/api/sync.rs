//! Cross-device transcript sync, keyed by public session id.
//!
//! Readers of an unknown session get an empty transcript rather than a
//! 404 so a fresh device can poll before its first push. Writers create
//! the session on demand.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use axum::Extension;
use serde::Deserialize;

use cb_domain::ActorScope;
use cb_history::transcript::sync_view;
use cb_history::IncomingMessage;

use crate::api::{error_response, validation_error};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/chat/session/:session_id/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn read(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.history.session_messages(scope, &session_id).await {
        Ok(messages) => Json(serde_json::json!({
            "messages": messages.iter().map(sync_view).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/chat/session/:session_id/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub messages: Option<Vec<IncomingMessage>>,
}

/// Append a batch of messages in request order. Any invalid role rejects
/// the whole batch before a single row is written.
pub async fn write(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Path(session_id): Path<String>,
    Json(body): Json<SyncRequest>,
) -> impl IntoResponse {
    let Some(messages) = body.messages else {
        return validation_error("messages", "required");
    };
    match state
        .history
        .sync_messages(scope, &session_id, messages)
        .await
    {
        Ok((_, created)) => Json(serde_json::json!({
            "success": true,
            "created_count": created,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /api/chat/session/:session_id/messages/last
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drop the most recent message, used by the client's undo button. An
/// already-empty transcript is not an error.
pub async fn pop(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.history.pop_last_message(scope, &session_id).await {
        Ok(Some(_)) => Json(serde_json::json!({ "success": true })).into_response(),
        Ok(None) => Json(serde_json::json!({
            "success": true,
            "message": "No messages to remove",
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}
