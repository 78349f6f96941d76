//! Session management endpoints.
//!
//! List/create work on the caller's scope; the numeric-id routes load the
//! session unscoped first so a foreign session answers 403 rather than
//! blending into 404.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::Deserialize;
use serde_json::Value;

use cb_domain::ActorScope;
use cb_history::transcript::{message_view, session_view};
use cb_history::SessionAttributes;

use crate::api::{error_response, validation_error};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/chat/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All of the caller's sessions, most recently touched first.
pub async fn list(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
) -> impl IntoResponse {
    match state.history.list_sessions(scope).await {
        Ok(sessions) => Json(serde_json::json!({
            "sessions": sessions.iter().map(session_view).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/chat/sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Create a session unconditionally. A missing `session_id` gets a minted
/// identifier, a missing `name` gets a wall-clock default.
pub async fn create(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Json(body): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    if let Some(resp) = check_len("name", body.name.as_deref(), 255) {
        return resp;
    }
    if let Some(resp) = check_len("session_id", body.session_id.as_deref(), 191) {
        return resp;
    }
    if let Some(resp) = check_len("device_id", body.device_id.as_deref(), 255) {
        return resp;
    }
    if let Some(resp) = check_len("provider", body.provider.as_deref(), 100) {
        return resp;
    }
    if let Some(resp) = check_len("model", body.model.as_deref(), 100) {
        return resp;
    }

    let attrs = SessionAttributes {
        name: body.name,
        device_id: body.device_id,
        provider: body.provider,
        model: body.model,
        metadata: body.metadata,
        ..Default::default()
    };
    match state
        .history
        .create_session(scope, &attrs, body.session_id.as_deref())
        .await
    {
        Ok(session) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "session": session_view(&session) })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/chat/sessions/:id/messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One session and its transcript, addressed by rowid.
pub async fn show(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let session = match state.history.get_session(scope, id).await {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };
    match state.history.messages_in(&session).await {
        Ok(messages) => Json(serde_json::json!({
            "session": session_view(&session),
            "messages": messages.iter().map(message_view).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PUT /api/chat/sessions/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn rename(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Path(id): Path<i64>,
    Json(body): Json<RenameSessionRequest>,
) -> impl IntoResponse {
    let name = match body.name.as_deref().filter(|n| !n.is_empty()) {
        Some(n) => n,
        None => return validation_error("name", "required"),
    };
    if let Some(resp) = check_len("name", Some(name), 255) {
        return resp;
    }
    match state.history.rename_session(scope, id, name).await {
        Ok(session) => Json(serde_json::json!({ "session": session_view(&session) }))
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /api/chat/sessions/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delete a session and its messages.
pub async fn remove(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.history.delete_session(scope, id).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Length cap mirroring the storage column limits.
fn check_len(field: &str, value: Option<&str>, max: usize) -> Option<Response> {
    match value {
        Some(v) if v.chars().count() > max => Some(validation_error(
            field,
            &format!("must not exceed {max} characters"),
        )),
        _ => None,
    }
}
