//! Wire views of stored records.
//!
//! Rows written by older clients can miss per-tool-call bookkeeping, so the
//! transcript view repairs them on the way out: entries without a `status`
//! get one derived from their `error`/`result` keys, and entries without a
//! `timestamp` inherit their own `created_at`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::types::{MessageRecord, Role, SessionRecord};

/// A message as the chat frontend renders it.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub content: Option<String>,
    pub role: Role,
    pub tool_calls: Option<Value>,
    pub iterations: i64,
    pub device_id: Option<String>,
    pub metadata: Value,
    pub created_at: String,
}

/// A session as listed in the sidebar. Ownership and raw metadata stay
/// server-side.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: i64,
    pub session_id: String,
    pub name: String,
    pub device_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub last_message_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Compact shape served to pull-style sync clients. Tool calls pass through
/// exactly as stored.
#[derive(Debug, Clone, Serialize)]
pub struct SyncMessageView {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Option<Value>,
    pub metadata: Value,
}

pub fn message_view(record: &MessageRecord) -> MessageView {
    MessageView {
        id: record.id,
        content: record.content.clone(),
        role: record.role,
        tool_calls: normalize_tool_calls(record.tool_calls.clone()),
        iterations: record.iterations,
        device_id: record.device_id.clone(),
        metadata: record.metadata.clone().unwrap_or_else(|| json!({})),
        created_at: iso(record.created_at),
    }
}

pub fn session_view(record: &SessionRecord) -> SessionView {
    SessionView {
        id: record.id,
        session_id: record.session_id.clone(),
        name: record.name.clone(),
        device_id: record.device_id.clone(),
        provider: record.provider.clone(),
        model: record.model.clone(),
        last_message_at: record.last_message_at.map(iso),
        created_at: iso(record.created_at),
        updated_at: iso(record.updated_at),
    }
}

pub fn sync_view(record: &MessageRecord) -> SyncMessageView {
    SyncMessageView {
        role: record.role,
        content: record.content.clone(),
        tool_calls: record.tool_calls.clone(),
        metadata: record.metadata.clone().unwrap_or_else(|| json!({})),
    }
}

/// Backfill `status` and `timestamp` on tool call entries. Only arrays are
/// touched; scalars and objects pass through untouched, as do non-object
/// array entries.
fn normalize_tool_calls(raw: Option<Value>) -> Option<Value> {
    let Some(Value::Array(entries)) = raw else {
        return raw;
    };
    let entries = entries
        .into_iter()
        .map(|entry| match entry {
            Value::Object(mut map) => {
                if !map.contains_key("status") {
                    let status = if map.contains_key("error") {
                        "error"
                    } else if map.contains_key("result") {
                        "completed"
                    } else {
                        "pending"
                    };
                    map.insert("status".into(), Value::String(status.into()));
                }
                if !map.contains_key("timestamp") {
                    if let Some(created) = map.get("created_at").cloned() {
                        map.insert("timestamp".into(), created);
                    }
                }
                Value::Object(map)
            }
            other => other,
        })
        .collect();
    Some(Value::Array(entries))
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
