//! Upstream AI provider proxy.
//!
//! Each configured provider gets its own `reqwest` client with the
//! provider's timeout baked in. Keys come from config or from the
//! environment variable the provider names; they are read once at startup.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};

use cb_domain::config::{AiConfig, UpstreamConfig};
use cb_domain::{Error, Result};

/// Reply served in place of assistant content when the upstream call fails
/// on a path that must not surface the error to the end user.
pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble responding right now. Please try again in a moment.";

/// The assistant turn extracted from an upstream chat completion.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: Option<String>,
    pub tool_calls: Option<Value>,
    pub role: String,
}

struct Upstream {
    config: UpstreamConfig,
    client: reqwest::Client,
    api_key: Option<String>,
}

pub struct AiProxy {
    upstreams: HashMap<String, Upstream>,
    default_provider: Option<String>,
}

impl AiProxy {
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let mut upstreams = HashMap::new();
        for upstream in &config.providers {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(upstream.timeout_secs))
                .build()
                .map_err(|e| {
                    Error::Config(format!("building HTTP client for '{}': {e}", upstream.id))
                })?;
            let api_key = upstream
                .api_key
                .clone()
                .or_else(|| {
                    upstream
                        .api_key_env
                        .as_ref()
                        .and_then(|var| std::env::var(var).ok())
                })
                .filter(|k| !k.is_empty());
            if api_key.is_none() {
                tracing::warn!(
                    provider = %upstream.id,
                    "no API key available — requests to this provider will fail"
                );
            }
            upstreams.insert(
                upstream.id.clone(),
                Upstream {
                    config: upstream.clone(),
                    client,
                    api_key,
                },
            );
        }
        Ok(Self {
            upstreams,
            default_provider: config.default_provider.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    /// Send a chat completion request and extract the first choice.
    ///
    /// `provider` falls back to the configured default provider; `model`
    /// falls back to the provider's default model.
    pub async fn chat(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        messages: &[Value],
        tools: Option<&Value>,
    ) -> Result<ChatReply> {
        let id = provider
            .or(self.default_provider.as_deref())
            .ok_or_else(|| upstream_err("-", "no provider requested and no default configured"))?;
        let upstream = self
            .upstreams
            .get(id)
            .ok_or_else(|| upstream_err(id, "unknown provider"))?;
        let key = upstream
            .api_key
            .as_deref()
            .ok_or_else(|| upstream_err(id, "API key not configured"))?;
        let model = model
            .or(upstream.config.default_model.as_deref())
            .ok_or_else(|| upstream_err(id, "no model requested and no default configured"))?;

        let mut payload = json!({
            "model": model,
            "messages": messages,
            "temperature": 0.7,
        });
        if let Some(tools) = tools {
            payload["tools"] = tools.clone();
            payload["tool_choice"] = json!("auto");
        }

        let url = format!(
            "{}/chat/completions",
            upstream.config.base_url.trim_end_matches('/')
        );
        tracing::debug!(provider = %id, model = %model, "forwarding chat completion");

        let response = upstream
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| upstream_err(id, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_err(id, format!("HTTP {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| upstream_err(id, format!("invalid response body: {e}")))?;
        Ok(parse_reply(&body))
    }
}

fn upstream_err(provider: &str, message: impl Into<String>) -> Error {
    Error::Upstream {
        provider: provider.to_owned(),
        message: message.into(),
    }
}

/// Pull the first choice's message out of a chat completion body. Missing
/// pieces degrade to `None` rather than failing the whole reply.
fn parse_reply(body: &Value) -> ChatReply {
    let message = &body["choices"][0]["message"];
    ChatReply {
        content: message
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_owned),
        tool_calls: message
            .get("tool_calls")
            .filter(|v| !v.is_null())
            .cloned(),
        role: message
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or("assistant")
            .to_owned(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
