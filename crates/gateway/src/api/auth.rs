//! Actor-resolution middleware.
//!
//! Every route passes through here. A bearer token is hashed with SHA-256
//! and compared against the configured token digests in constant time; a
//! match binds the request to that user's scope. Requests without a token
//! fall back to the anonymous scope unless `auth.require_token` is set.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use cb_domain::ActorScope;

use crate::state::{AppState, TokenEntry};

/// Axum middleware that resolves the request's [`ActorScope`] and stores it
/// in the request extensions. Attach via `middleware::from_fn_with_state`.
pub async fn resolve_actor(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty());

    let scope = match provided {
        Some(token) => match match_token(&state.tokens, token) {
            Some(user_id) => ActorScope::User(user_id),
            None => {
                return (
                    axum::http::StatusCode::UNAUTHORIZED,
                    axum::Json(serde_json::json!({ "error": "invalid API token" })),
                )
                    .into_response();
            }
        },
        None => {
            if state.config.auth.require_token {
                return (
                    axum::http::StatusCode::UNAUTHORIZED,
                    axum::Json(serde_json::json!({ "error": "missing API token" })),
                )
                    .into_response();
            }
            ActorScope::Anonymous
        }
    };

    req.extensions_mut().insert(scope);
    next.run(req).await
}

/// Compare the token's digest against every configured entry. The scan
/// always visits the full list so timing does not reveal where (or
/// whether) a match occurred.
fn match_token(tokens: &[TokenEntry], token: &str) -> Option<i64> {
    let digest = Sha256::digest(token.as_bytes());
    let mut matched: Option<i64> = None;
    for entry in tokens {
        if bool::from(digest.ct_eq(entry.digest.as_slice())) {
            matched = matched.or(Some(entry.user_id));
        }
    }
    matched
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token: &str, user_id: i64) -> TokenEntry {
        TokenEntry {
            digest: Sha256::digest(token.as_bytes()).to_vec(),
            user_id,
        }
    }

    #[test]
    fn matching_token_yields_its_user() {
        let tokens = vec![entry("alpha", 1), entry("beta", 2)];
        assert_eq!(match_token(&tokens, "alpha"), Some(1));
        assert_eq!(match_token(&tokens, "beta"), Some(2));
    }

    #[test]
    fn unknown_token_yields_none() {
        let tokens = vec![entry("alpha", 1)];
        assert_eq!(match_token(&tokens, "gamma"), None);
        assert_eq!(match_token(&[], "alpha"), None);
    }
}
