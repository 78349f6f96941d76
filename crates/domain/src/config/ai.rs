use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AI proxy upstreams
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Registered AI upstreams for the proxy endpoint and the fallback chat
/// flow. Every upstream is treated as an opaque OpenAI-compatible
/// chat-completions endpoint; adding a provider means adding config, not
/// code.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AiConfig {
    /// Provider used when a request names none. Must match a configured id.
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub providers: Vec<UpstreamConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Identifier clients send as `provider` (e.g. "openai").
    pub id: String,
    /// Base URL, e.g. `https://api.openai.com/v1`. The proxy appends
    /// `/chat/completions`.
    pub base_url: String,
    /// Direct API key (for config-only setups; prefer `api_key_env`).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Env var containing the key. Checked when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Model used when a request names none.
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "d_120")]
    pub timeout_secs: u64,
}

fn d_120() -> u64 {
    120
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_config_defaults_to_no_upstreams() {
        let cfg = AiConfig::default();
        assert!(cfg.providers.is_empty());
        assert!(cfg.default_provider.is_none());
    }

    #[test]
    fn ai_config_parses_upstream_list() {
        let toml_str = r#"
            default_provider = "openai"

            [[providers]]
            id = "openai"
            base_url = "https://api.openai.com/v1"
            api_key_env = "OPENAI_API_KEY"
            default_model = "gpt-4o-mini"

            [[providers]]
            id = "local"
            base_url = "http://localhost:11434/v1"
            timeout_secs = 30
        "#;
        let cfg: AiConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.default_provider.as_deref(), Some("openai"));
        assert_eq!(cfg.providers.len(), 2);
        assert_eq!(cfg.providers[0].timeout_secs, 120);
        assert_eq!(cfg.providers[1].timeout_secs, 30);
        assert!(cfg.providers[1].api_key.is_none());
    }
}
