//! Message persistence endpoints used by the desktop client.
//!
//! `save` records a full user/assistant exchange in one transaction,
//! `update` patches a stored row in place, and the two clear variants
//! wipe transcripts without deleting the sessions themselves.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use axum::Extension;
use serde::Deserialize;
use serde_json::Value;

use cb_domain::ActorScope;
use cb_history::transcript::session_view;
use cb_history::{AppendPair, MessagePatch};

use crate::api::{error_response, validation_error};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/chat/save-messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct SaveMessagesRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub user_message: Option<UserTurn>,
    #[serde(default)]
    pub assistant_message: Option<AssistantTurn>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserTurn {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssistantTurn {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Value>,
    #[serde(default)]
    pub iterations: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Persist one exchange, resolving (or creating) the target session and
/// bumping its activity watermark, all in a single transaction.
pub async fn save(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Json(body): Json<SaveMessagesRequest>,
) -> impl IntoResponse {
    let user_content = body
        .user_message
        .as_ref()
        .and_then(|turn| turn.content.clone())
        .filter(|c| !c.is_empty());
    let Some(user_content) = user_content else {
        return validation_error("user_message.content", "required");
    };
    let assistant = body.assistant_message.unwrap_or_default();

    let pair = AppendPair {
        session_id: body.session_id,
        session_name: body.session_name,
        device_id: body.device_id,
        provider: body.provider,
        model: body.model,
        user_content,
        assistant_content: assistant.content,
        assistant_tool_calls: assistant.tool_calls,
        assistant_iterations: assistant.iterations.unwrap_or(0),
        assistant_metadata: assistant.metadata,
    };
    match state.history.append_pair(scope, pair).await {
        Ok(outcome) => Json(serde_json::json!({
            "success": true,
            "user_message": outcome.user_message,
            "assistant_message": outcome.assistant_message,
            "session": session_view(&outcome.session),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/chat/update-message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(flatten)]
    pub patch: MessagePatch,
}

/// Patch a stored message. Absent fields stay untouched; explicit nulls
/// clear their column.
pub async fn update(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Json(body): Json<UpdateMessageRequest>,
) -> impl IntoResponse {
    let Some(message_id) = body.message_id else {
        return validation_error("message_id", "required");
    };
    match state
        .history
        .update_message(scope, message_id, body.patch)
        .await
    {
        Ok(message) => Json(serde_json::json!({
            "success": true,
            "message": message,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/chat/clear
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Delete messages from one session, or from every session in scope when
/// no `session_id` is given. Sessions survive with their watermark reset.
pub async fn clear(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Json(body): Json<ClearRequest>,
) -> impl IntoResponse {
    match state
        .history
        .clear_messages(scope, body.session_id.as_deref())
        .await
    {
        Ok(deleted) => Json(serde_json::json!({
            "success": true,
            "deleted_count": deleted,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/chat/session/:session_id/clear
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Path-addressed variant of `clear` for a single session.
pub async fn clear_session(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state
        .history
        .clear_messages(scope, Some(&session_id))
        .await
    {
        Ok(_) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => error_response(&e),
    }
}
