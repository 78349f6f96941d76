mod ai;
mod auth;
mod server;
mod storage;

pub use ai::*;
pub use auth::*;
pub use server::*;
pub use storage::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity of a single lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// One finding from [`Config::validate`]. `field` is the TOML path of
/// the offending key.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "error",
            ConfigSeverity::Warning => "warning",
        };
        write!(f, "{tag}: {} — {}", self.field, self.message)
    }
}

fn err(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError {
        severity: ConfigSeverity::Error,
        field: field.into(),
        message: message.into(),
    }
}

fn warn(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError {
        severity: ConfigSeverity::Warning,
        field: field.into(),
        message: message.into(),
    }
}

impl Config {
    /// Lint the whole config. Startup aborts on any `Error` finding;
    /// warnings are surfaced but do not block.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut findings = Vec::new();

        if self.server.port == 0 {
            findings.push(err("server.port", "must not be 0"));
        }
        if self.server.host.is_empty() {
            findings.push(err("server.host", "bind host is empty"));
        }
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            findings.push(warn(
                "server.cors.allowed_origins",
                "\"*\" accepts any origin; prefer an explicit list in production",
            ));
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                findings.push(err("server.rate_limit.requests_per_second", "must be at least 1"));
            }
            if rl.burst_size == 0 {
                findings.push(err("server.rate_limit.burst_size", "must be at least 1"));
            }
        }

        if self.storage.db_path.as_os_str().is_empty() {
            findings.push(err("storage.db_path", "no database path set"));
        }
        if self.history.page_limit == 0 {
            findings.push(err("history.page_limit", "must be at least 1"));
        }

        // Requiring tokens with none configured would lock everyone out.
        if self.auth.require_token && self.auth.tokens.is_empty() {
            findings.push(err(
                "auth.require_token",
                "enabled with an empty [auth.tokens] table — every request would be rejected",
            ));
        }

        if self.ai.providers.is_empty() {
            findings.push(warn(
                "ai.providers",
                "no upstream providers; the relay endpoint will return errors",
            ));
        }
        for (i, provider) in self.ai.providers.iter().enumerate() {
            if provider.id.is_empty() {
                findings.push(err(format!("ai.providers[{i}].id"), "missing id"));
            }
            if provider.base_url.is_empty() {
                findings.push(err(format!("ai.providers[{i}].base_url"), "missing base_url"));
            }
            if self.ai.providers[..i].iter().any(|p| p.id == provider.id) {
                findings.push(err(
                    format!("ai.providers[{i}].id"),
                    format!("duplicate id '{}' (already used by an earlier provider)", provider.id),
                ));
            }
        }
        if let Some(default) = &self.ai.default_provider {
            if !self.ai.providers.iter().any(|p| &p.id == default) {
                findings.push(err(
                    "ai.default_provider",
                    format!("'{default}' does not match any [[ai.providers]] id"),
                ));
            }
        }

        findings
    }
}
