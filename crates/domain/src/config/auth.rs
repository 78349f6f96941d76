use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bearer-token actor mapping.
///
/// Each entry maps a token to the numeric user id requests carrying it act
/// as. Tokens are hashed (SHA-256) once at startup; raw tokens never live in
/// server state after boot. Requests without a token run in the anonymous
/// scope unless `require_token` is set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// token -> user id.
    #[serde(default)]
    pub tokens: HashMap<String, i64>,
    /// Reject requests that carry no token instead of treating them as
    /// anonymous. A request with an unknown token is rejected either way.
    #[serde(default)]
    pub require_token: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
