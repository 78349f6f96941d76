use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding sessions and messages.
    /// Parent directories are created on startup.
    #[serde(default = "d_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: d_db_path(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// History reads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum messages returned by the history endpoint.
    #[serde(default = "d_100")]
    pub page_limit: usize,
    /// Recent messages sent as context in the fallback chat flow.
    #[serde(default = "d_10")]
    pub recent_context: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_limit: 100,
            recent_context: 10,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_db_path() -> PathBuf {
    PathBuf::from("data/chatbridge.db")
}
fn d_100() -> usize {
    100
}
fn d_10() -> usize {
    10
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_defaults() {
        let cfg = StorageConfig::default();
        assert_eq!(cfg.db_path, PathBuf::from("data/chatbridge.db"));
    }

    #[test]
    fn history_empty_toml_uses_defaults() {
        let cfg: HistoryConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.page_limit, 100);
        assert_eq!(cfg.recent_context, 10);
    }

    #[test]
    fn history_page_limit_overridable() {
        let cfg: HistoryConfig = toml::from_str("page_limit = 250").unwrap();
        assert_eq!(cfg.page_limit, 250);
        assert_eq!(cfg.recent_context, 10);
    }
}
