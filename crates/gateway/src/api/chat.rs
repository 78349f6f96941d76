//! Chat page payload, history reads, and the legacy single-turn endpoint.
//!
//! - `GET /chat`             — everything the frontend needs to render
//! - `GET /api/chat/history` — transcript of one session (or the whole scope)
//! - `POST /api/chat`        — legacy turn: persist, call upstream, persist

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use axum::Extension;
use serde::Deserialize;

use cb_domain::ActorScope;
use cb_history::transcript::{message_view, session_view};
use cb_history::{NewMessage, Role, SessionAttributes};

use crate::api::{error_response, validation_error};
use crate::providers::FALLBACK_REPLY;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Bootstrap payload for the chat frontend: the caller's sessions, the
/// active session, and its transcript. A scope with no sessions gets a
/// fresh default session so the page never renders empty-handed.
pub async fn page(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let mut sessions = match state.history.list_sessions(scope).await {
        Ok(s) => s,
        Err(e) => return error_response(&e),
    };
    if sessions.is_empty() {
        match state
            .history
            .resolve_session(scope, None, &SessionAttributes::default())
            .await
        {
            Ok(created) => sessions.push(created),
            Err(e) => return error_response(&e),
        }
    }

    // The requested session only becomes active when it is in the list;
    // anything else falls back to the most recently touched one.
    let active = query
        .session_id
        .as_deref()
        .and_then(|sid| sessions.iter().find(|s| s.session_id == sid))
        .unwrap_or(&sessions[0])
        .clone();

    let messages = match state.history.messages_in(&active).await {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };

    Json(serde_json::json!({
        "messages": messages.iter().map(message_view).collect::<Vec<_>>(),
        "sessions": sessions.iter().map(session_view).collect::<Vec<_>>(),
        "activeSession": session_view(&active),
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/chat/history
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Transcript of the named session, or of every in-scope message when no
/// session is named. Capped at the configured page limit, oldest first.
pub async fn history(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = state.config.history.page_limit;
    match state
        .history
        .history_messages(scope, query.session_id.as_deref(), limit)
        .await
    {
        Ok(messages) => Json(serde_json::json!({
            "messages": messages.iter().map(message_view).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/chat (legacy single-turn)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct StoreRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Optional provider override; defaults to the configured provider.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Persist the user's message, answer it with the upstream provider using
/// the scope's recent messages as context, and persist the reply.
///
/// The endpoint never fails on upstream trouble: any provider error is
/// logged and the assistant row carries a fallback reply instead.
pub async fn store(
    State(state): State<AppState>,
    Extension(scope): Extension<ActorScope>,
    Json(body): Json<StoreRequest>,
) -> impl IntoResponse {
    let content = match body.content.as_deref().filter(|c| !c.is_empty()) {
        Some(c) => c.to_owned(),
        None => return validation_error("content", "required"),
    };

    let user_message = match state
        .history
        .insert_message(
            scope,
            None,
            &NewMessage {
                role: Role::User,
                content: Some(content),
                tool_calls: None,
                iterations: 0,
                device_id: body.device_id.clone(),
                metadata: None,
            },
        )
        .await
    {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };

    // Recent context includes the row just written.
    let context = match state
        .history
        .recent_messages(scope, state.config.history.recent_context)
        .await
    {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };
    let upstream_messages: Vec<serde_json::Value> = context
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": m.content.clone().unwrap_or_default(),
            })
        })
        .collect();

    let reply = match state
        .ai
        .chat(
            body.provider.as_deref(),
            body.model.as_deref(),
            &upstream_messages,
            None,
        )
        .await
    {
        Ok(reply) => reply.content.unwrap_or_else(|| FALLBACK_REPLY.to_owned()),
        Err(e) => {
            tracing::warn!(error = %e, "upstream chat failed, serving fallback reply");
            FALLBACK_REPLY.to_owned()
        }
    };

    let assistant_message = match state
        .history
        .insert_message(
            scope,
            None,
            &NewMessage {
                role: Role::Assistant,
                content: Some(reply),
                tool_calls: None,
                iterations: 0,
                device_id: body.device_id.clone(),
                metadata: None,
            },
        )
        .await
    {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };

    Json(serde_json::json!({
        "user_message": user_message,
        "assistant_message": assistant_message,
    }))
    .into_response()
}
