//! Startup wiring: config lint, store open, token hashing, provider setup.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use cb_domain::config::{Config, ConfigSeverity};
use cb_history::HistoryStore;

use crate::providers::AiProxy;
use crate::state::{AppState, TokenEntry};

/// Turn the parsed config into live subsystems and hand back the shared
/// [`AppState`]. Aborts startup on any error-severity config finding.
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let mut config_errors = 0usize;
    for finding in config.validate() {
        match finding.severity {
            ConfigSeverity::Warning => tracing::warn!("{finding}"),
            ConfigSeverity::Error => {
                config_errors += 1;
                tracing::error!("{finding}");
            }
        }
    }
    if config_errors > 0 {
        anyhow::bail!("refusing to start: {config_errors} config error(s)");
    }

    // ── History store ────────────────────────────────────────────────
    if let Some(parent) = config.storage.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let history = Arc::new(
        HistoryStore::open(&config.storage.db_path).context("opening history store")?,
    );

    // ── Auth tokens (hashed once, compared in constant time later) ───
    let tokens: Vec<TokenEntry> = config
        .auth
        .tokens
        .iter()
        .map(|(token, user_id)| TokenEntry {
            digest: Sha256::digest(token.as_bytes()).to_vec(),
            user_id: *user_id,
        })
        .collect();
    if tokens.is_empty() {
        tracing::warn!("no auth tokens configured — all requests run in the anonymous scope");
    } else {
        tracing::info!(tokens = tokens.len(), "bearer-token auth ready");
    }

    // ── AI providers ─────────────────────────────────────────────────
    let ai = Arc::new(AiProxy::from_config(&config.ai).context("initializing AI providers")?);
    if ai.is_empty() {
        tracing::info!("no AI providers configured — chat proxying disabled");
    } else {
        tracing::info!(providers = ai.len(), "AI provider proxy ready");
    }

    Ok(AppState {
        config,
        history,
        ai,
        tokens: Arc::new(tokens),
    })
}
