use std::sync::Arc;

use cb_domain::config::Config;
use cb_history::HistoryStore;

use crate::providers::AiProxy;

/// A configured bearer token, hashed at startup, and the user it maps to.
pub struct TokenEntry {
    pub digest: Vec<u8>,
    pub user_id: i64,
}

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Session and message persistence.
    pub history: Arc<HistoryStore>,
    /// Upstream AI providers.
    pub ai: Arc<AiProxy>,
    /// SHA-256 digests of configured bearer tokens (computed at startup).
    /// Empty = every request runs in the anonymous scope.
    pub tokens: Arc<Vec<TokenEntry>>,
}
