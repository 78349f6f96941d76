//! HTTP gateway for ChatBridge: routing, actor resolution, upstream AI
//! proxying, and the CLI entry points.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod providers;
pub mod state;
