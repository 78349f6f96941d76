//! Direct relay to a configured AI provider.
//!
//! Unlike the `/api/chat` flow this endpoint persists nothing; the client
//! supplies the full conversation and receives the provider's reply, with
//! a canned fallback body on upstream failure so the UI always has text
//! to show.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::api::validation_error;
use crate::providers::FALLBACK_REPLY;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/ai/chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct ProxyChatRequest {
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ProxyChatRequest>,
) -> impl IntoResponse {
    let Some(messages) = body.messages else {
        return validation_error("messages", "required");
    };
    let Some(model) = body.model.as_deref().filter(|m| !m.is_empty()) else {
        return validation_error("model", "required");
    };
    let Some(provider) = body.provider.as_deref().filter(|p| !p.is_empty()) else {
        return validation_error("provider", "required");
    };

    match state
        .ai
        .chat(Some(provider), Some(model), &messages, body.tools.as_ref())
        .await
    {
        Ok(reply) => Json(serde_json::json!({
            "content": reply.content,
            "tool_calls": reply.tool_calls,
            "role": reply.role,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(provider, model, error = %e, "ai relay failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": e.to_string(),
                    "content": FALLBACK_REPLY,
                })),
            )
                .into_response()
        }
    }
}
