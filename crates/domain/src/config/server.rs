use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HTTP listener settings for the gateway binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Browser origins the chat frontend may call us from.
    #[serde(default)]
    pub cors: CorsConfig,
    /// Optional per-IP throttle. Absent means no limiter is installed,
    /// which is the right call for a single-user local deployment.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            cors: CorsConfig::default(),
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. Entries ending in `:*` match any port on that
    /// host, so the dev frontend can move ports without a config edit.
    /// `["*"]` disables the check entirely; `validate()` warns about it.
    #[serde(default = "d_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_origins(),
        }
    }
}

/// Token-bucket throttle applied per client IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained rate: the bucket refills one token every
    /// `1 / requests_per_second` seconds.
    pub requests_per_second: u64,
    /// Bucket capacity, i.e. how far a client may run ahead of the
    /// sustained rate before receiving 429s.
    pub burst_size: u32,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    8000
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_origins() -> Vec<String> {
    vec![
        "http://localhost:*".into(),
        "http://127.0.0.1:*".into(),
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
