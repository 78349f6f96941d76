//! Shared domain types for ChatBridge.
//!
//! Holds the error taxonomy, actor scoping, and configuration shared by the
//! history store and the gateway. Everything here is persistence- and
//! transport-agnostic.

pub mod actor;
pub mod config;
pub mod error;

pub use actor::ActorScope;
pub use error::{Error, Result};
