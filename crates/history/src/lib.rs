//! Session and message history for ChatBridge.
//!
//! Persists conversation threads and their ordered turns in SQLite, resolves
//! client-supplied session identifiers to owned rows (find-or-create with a
//! partial attribute merge), and shapes stored rows into the transcript
//! views the chat frontend consumes.

pub mod resolver;
pub mod store;
pub mod transcript;
pub mod types;

pub use resolver::SessionAttributes;
pub use store::{
    AppendOutcome, AppendPair, HistoryStore, IncomingMessage, MessagePatch, NewMessage,
};
pub use types::{MessageRecord, Role, SessionRecord};
