//! Session resolution: partial attribute merge for find-or-create.
//!
//! Clients re-send whatever descriptive fields they happen to know on every
//! request, so the merge has to be conservative. Per field:
//!
//! - `name`, `device_id`, `provider`, `model`: overwrite only when the
//!   incoming value is non-empty and differs from the stored one.
//! - `metadata`: a non-empty incoming object is unioned into the stored
//!   object, incoming keys winning. Scalars and empty objects are ignored.
//! - `last_message_at`: overwrite when supplied.
//!
//! Re-resolving with identical attributes must produce an empty change set
//! so the store performs zero writes.

use chrono::{DateTime, Local, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::SessionRecord;

/// Descriptive fields supplied alongside a session identifier.
#[derive(Debug, Clone, Default)]
pub struct SessionAttributes {
    pub name: Option<String>,
    pub device_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub metadata: Option<Value>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Field updates produced by [`session_changes`]. `None` leaves the stored
/// value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionChanges {
    pub name: Option<String>,
    pub device_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub metadata: Option<Value>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl SessionChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.device_id.is_none()
            && self.provider.is_none()
            && self.model.is_none()
            && self.metadata.is_none()
            && self.last_message_at.is_none()
    }
}

/// Compute the change set for `current` under `incoming`.
pub fn session_changes(current: &SessionRecord, incoming: &SessionAttributes) -> SessionChanges {
    let mut changes = SessionChanges {
        name: replacement(Some(current.name.as_str()), incoming.name.as_deref()),
        device_id: replacement(current.device_id.as_deref(), incoming.device_id.as_deref()),
        provider: replacement(current.provider.as_deref(), incoming.provider.as_deref()),
        model: replacement(current.model.as_deref(), incoming.model.as_deref()),
        ..SessionChanges::default()
    };

    if let Some(Value::Object(incoming_map)) = &incoming.metadata {
        if !incoming_map.is_empty() {
            let mut merged = match &current.metadata {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            for (key, value) in incoming_map {
                merged.insert(key.clone(), value.clone());
            }
            let merged = Value::Object(merged);
            if current.metadata.as_ref() != Some(&merged) {
                changes.metadata = Some(merged);
            }
        }
    }

    if let Some(ts) = incoming.last_message_at {
        if current.last_message_at != Some(ts) {
            changes.last_message_at = Some(ts);
        }
    }

    changes
}

fn replacement(current: Option<&str>, incoming: Option<&str>) -> Option<String> {
    match incoming {
        Some(value) if !value.is_empty() && current != Some(value) => Some(value.to_owned()),
        _ => None,
    }
}

/// Identifier minted for sessions created without one.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Display name for sessions created without one, in local wall-clock time.
pub fn default_session_name(now: DateTime<Local>) -> String {
    format!("Session {}", now.format("%H:%M"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
