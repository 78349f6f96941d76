//! SQLite-backed persistence for sessions and messages.
//!
//! Persistence model:
//! - One connection behind an async mutex; every public operation takes the
//!   lock once, so operations are serialized end to end.
//! - Multi-row writes (append, sync, delete, clear) run inside a SQLite
//!   transaction and commit atomically.
//! - Timestamps are stored as RFC 3339 text at fixed microsecond precision,
//!   so lexicographic order in SQL equals chronological order.
//! - Scope filters bind `user_id IS ?`; `IS` matches a bound NULL, so one
//!   query text covers both authenticated and anonymous scopes.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio::sync::Mutex;

use cb_domain::{ActorScope, Error, Result};

use crate::resolver::{self, SessionAttributes, SessionChanges};
use crate::types::{MessageRecord, Role, SessionRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id      TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    user_id         INTEGER,
    device_id       TEXT,
    provider        TEXT,
    model           TEXT,
    metadata        TEXT,
    last_message_at TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_session_id INTEGER,
    user_id         INTEGER,
    role            TEXT NOT NULL,
    content         TEXT,
    tool_calls      TEXT,
    iterations      INTEGER NOT NULL DEFAULT 0,
    device_id       TEXT,
    metadata        TEXT,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(chat_session_id);
CREATE INDEX IF NOT EXISTS idx_messages_created ON messages(created_at);
";

const SELECT_SESSION: &str = "SELECT id, session_id, name, user_id, device_id, provider, model, \
     metadata, last_message_at, created_at, updated_at FROM sessions";

const SELECT_MESSAGE: &str = "SELECT id, chat_session_id, user_id, role, content, tool_calls, \
     iterations, device_id, metadata, created_at FROM messages";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Operation payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Row content for a single message insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Option<Value>,
    pub iterations: i64,
    pub device_id: Option<String>,
    pub metadata: Option<Value>,
}

/// One user turn plus the assistant turn answering it, persisted together.
#[derive(Debug, Clone, Default)]
pub struct AppendPair {
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    pub device_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub user_content: String,
    pub assistant_content: Option<String>,
    pub assistant_tool_calls: Option<Value>,
    pub assistant_iterations: i64,
    pub assistant_metadata: Option<Value>,
}

/// Result of [`HistoryStore::append_pair`]: both rows as written plus the
/// session after its watermark update.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub session: SessionRecord,
    pub user_message: MessageRecord,
    pub assistant_message: MessageRecord,
}

/// One item of a bulk sync write. Roles are validated before any insert;
/// a missing role reads as empty and fails that validation.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Partial update for one message.
///
/// Nullable columns use double-`Option`: outer `None` means the field was
/// absent and stays untouched, `Some(None)` means an explicit null clears
/// the column. `iterations` is NOT NULL, so it takes plain values only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePatch {
    #[serde(default, deserialize_with = "double_option")]
    pub content: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub tool_calls: Option<Option<Value>>,
    #[serde(default)]
    pub iterations: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub metadata: Option<Option<Value>>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Keeps an explicit JSON null distinguishable from an absent field.
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// SQLite-backed session and message store.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        tracing::info!(path = %path.as_ref().display(), "history store opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // ── session operations ──────────────────────────────────────────────

    /// Look up a session by string identifier within the caller's scope.
    pub async fn find_session(
        &self,
        scope: ActorScope,
        session_id: &str,
    ) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock().await;
        Self::find_session_conn(&conn, scope, session_id)
    }

    /// Find the session for `session_id`, merging `attrs` into it, or create
    /// it (minting an identifier when `session_id` is `None`).
    pub async fn resolve_session(
        &self,
        scope: ActorScope,
        session_id: Option<&str>,
        attrs: &SessionAttributes,
    ) -> Result<SessionRecord> {
        let conn = self.conn.lock().await;
        let (session, created) = Self::resolve_session_conn(&conn, scope, session_id, attrs)?;
        if created {
            tracing::info!(session_id = %session.session_id, scope = ?scope, "session created");
        }
        Ok(session)
    }

    /// Insert a new session unconditionally. A duplicate `session_id`
    /// surfaces as a storage error.
    pub async fn create_session(
        &self,
        scope: ActorScope,
        attrs: &SessionAttributes,
        session_id: Option<&str>,
    ) -> Result<SessionRecord> {
        let conn = self.conn.lock().await;
        let session = Self::insert_session_conn(&conn, scope, attrs, session_id)?;
        tracing::info!(session_id = %session.session_id, scope = ?scope, "session created");
        Ok(session)
    }

    /// All sessions in scope, most recently touched first.
    pub async fn list_sessions(&self, scope: ActorScope) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_SESSION} WHERE user_id IS ?1 ORDER BY updated_at DESC, id DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![scope.user_id()], row_to_session)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    /// Load a session by rowid. Unknown ids are not found; ids owned by a
    /// different scope are forbidden, so the two cases stay distinguishable.
    pub async fn get_session(&self, scope: ActorScope, id: i64) -> Result<SessionRecord> {
        let conn = self.conn.lock().await;
        Self::get_session_conn(&conn, scope, id)
    }

    /// Rename a session loaded by rowid.
    pub async fn rename_session(
        &self,
        scope: ActorScope,
        id: i64,
        name: &str,
    ) -> Result<SessionRecord> {
        let conn = self.conn.lock().await;
        let session = Self::get_session_conn(&conn, scope, id)?;
        let now = Utc::now();
        conn.execute(
            "UPDATE sessions SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name, fmt_ts(now), id],
        )
        .map_err(db_err)?;
        Ok(SessionRecord { name: name.to_owned(), updated_at: now, ..session })
    }

    /// Delete a session and all of its messages atomically.
    pub async fn delete_session(&self, scope: ActorScope, id: i64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let session = Self::get_session_conn(&conn, scope, id)?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM messages WHERE chat_session_id = ?1", params![id])
            .map_err(db_err)?;
        tx.execute("DELETE FROM sessions WHERE id = ?1", params![id]).map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        tracing::info!(session_id = %session.session_id, "session deleted");
        Ok(())
    }

    // ── message reads ───────────────────────────────────────────────────

    /// All messages of a loaded session, oldest first.
    pub async fn messages_in(&self, session: &SessionRecord) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().await;
        Self::messages_for_conn(&conn, session.id)
    }

    /// Messages of a session addressed by string identifier. An unknown
    /// session reads as empty rather than failing, so pull-style clients
    /// can poll before their first push.
    pub async fn session_messages(
        &self,
        scope: ActorScope,
        session_id: &str,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().await;
        match Self::find_session_conn(&conn, scope, session_id)? {
            Some(session) => Self::messages_for_conn(&conn, session.id),
            None => Ok(Vec::new()),
        }
    }

    /// History page: the addressed session's messages, or every in-scope
    /// message when no session is named. Oldest first, capped at `limit`.
    pub async fn history_messages(
        &self,
        scope: ActorScope,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().await;
        match session_id {
            Some(sid) => {
                let session = Self::find_session_conn(&conn, scope, sid)?
                    .ok_or_else(|| Error::NotFound("session not found".into()))?;
                let mut stmt = conn
                    .prepare(&format!(
                        "{SELECT_MESSAGE} WHERE chat_session_id = ?1 \
                         ORDER BY created_at ASC, id ASC LIMIT ?2"
                    ))
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map(params![session.id, limit as i64], row_to_message)
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err)?;
                Ok(rows)
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "{SELECT_MESSAGE} WHERE user_id IS ?1 \
                         ORDER BY created_at ASC, id ASC LIMIT ?2"
                    ))
                    .map_err(db_err)?;
                let rows = stmt
                    .query_map(params![scope.user_id(), limit as i64], row_to_message)
                    .map_err(db_err)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err)?;
                Ok(rows)
            }
        }
    }

    /// The newest `limit` in-scope messages, returned oldest first so they
    /// can be replayed as conversation context.
    pub async fn recent_messages(
        &self,
        scope: ActorScope,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_MESSAGE} WHERE user_id IS ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ))
            .map_err(db_err)?;
        let mut rows = stmt
            .query_map(params![scope.user_id(), limit as i64], row_to_message)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        rows.reverse();
        Ok(rows)
    }

    // ── message writes ──────────────────────────────────────────────────

    /// Insert a single message, attached to `session` when given.
    pub async fn insert_message(
        &self,
        scope: ActorScope,
        session: Option<&SessionRecord>,
        message: &NewMessage,
    ) -> Result<MessageRecord> {
        let conn = self.conn.lock().await;
        Self::insert_message_conn(&conn, scope, session.map(|s| s.id), message)
    }

    /// Persist a user/assistant turn pair in one transaction: resolve the
    /// session, insert both rows, then advance the session watermark.
    pub async fn append_pair(&self, scope: ActorScope, pair: AppendPair) -> Result<AppendOutcome> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(db_err)?;

        let attrs = SessionAttributes {
            name: pair.session_name.clone(),
            device_id: pair.device_id.clone(),
            provider: pair.provider.clone(),
            model: pair.model.clone(),
            ..Default::default()
        };
        let (session, created) =
            Self::resolve_session_conn(&tx, scope, pair.session_id.as_deref(), &attrs)?;

        let user_message = Self::insert_message_conn(
            &tx,
            scope,
            Some(session.id),
            &NewMessage {
                role: Role::User,
                content: Some(pair.user_content),
                tool_calls: None,
                iterations: 0,
                device_id: pair.device_id.clone(),
                metadata: None,
            },
        )?;

        let assistant_message = Self::insert_message_conn(
            &tx,
            scope,
            Some(session.id),
            &NewMessage {
                role: Role::Assistant,
                content: Some(pair.assistant_content.unwrap_or_default()),
                tool_calls: pair.assistant_tool_calls,
                iterations: pair.assistant_iterations,
                device_id: pair.device_id.clone(),
                metadata: pair.assistant_metadata,
            },
        )?;

        let watermark = SessionAttributes {
            device_id: pair.device_id,
            provider: pair.provider,
            model: pair.model,
            last_message_at: Some(Utc::now()),
            ..Default::default()
        };
        let session = Self::merge_session_conn(&tx, &session, &watermark)?;

        tx.commit().map_err(db_err)?;
        tracing::debug!(
            session_id = %session.session_id,
            created,
            user_message_id = user_message.id,
            assistant_message_id = assistant_message.id,
            "message pair appended"
        );
        Ok(AppendOutcome { session, user_message, assistant_message })
    }

    /// Bulk-insert client-pushed messages into a session, in request order.
    /// Every role is validated before the first write, so a bad item rejects
    /// the whole batch. The watermark advances once at the end.
    pub async fn sync_messages(
        &self,
        scope: ActorScope,
        session_id: &str,
        items: Vec<IncomingMessage>,
    ) -> Result<(SessionRecord, usize)> {
        let mut roles = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let role = Role::parse(&item.role).ok_or_else(|| Error::Validation {
                field: format!("messages[{i}].role"),
                message: "must be one of user, assistant, system".into(),
            })?;
            roles.push(role);
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(db_err)?;
        let (session, _) = Self::resolve_session_conn(
            &tx,
            scope,
            Some(session_id),
            &SessionAttributes::default(),
        )?;

        let mut created_count = 0usize;
        for (item, role) in items.into_iter().zip(roles) {
            Self::insert_message_conn(
                &tx,
                scope,
                Some(session.id),
                &NewMessage {
                    role,
                    content: Some(item.content.unwrap_or_default()),
                    tool_calls: item.tool_calls,
                    iterations: 0,
                    device_id: None,
                    metadata: item.metadata,
                },
            )?;
            created_count += 1;
        }

        let watermark = SessionAttributes {
            last_message_at: Some(Utc::now()),
            ..Default::default()
        };
        let session = Self::merge_session_conn(&tx, &session, &watermark)?;
        tx.commit().map_err(db_err)?;
        tracing::debug!(session_id = %session.session_id, created_count, "messages synced");
        Ok((session, created_count))
    }

    /// Apply a partial update to one message.
    ///
    /// A message already attached to a session is only writable by that
    /// session's owner. A detached message can be attached here when the
    /// patch names an in-scope session; an unknown name is skipped silently
    /// and the rest of the patch still applies.
    pub async fn update_message(
        &self,
        scope: ActorScope,
        message_id: i64,
        patch: MessagePatch,
    ) -> Result<MessageRecord> {
        let conn = self.conn.lock().await;
        let mut message = conn
            .query_row(
                &format!("{SELECT_MESSAGE} WHERE id = ?1"),
                params![message_id],
                row_to_message,
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| Error::NotFound("message not found".into()))?;

        match message.chat_session_id {
            Some(session_rowid) => {
                let session = conn
                    .query_row(
                        &format!("{SELECT_SESSION} WHERE id = ?1"),
                        params![session_rowid],
                        row_to_session,
                    )
                    .optional()
                    .map_err(db_err)?;
                if let Some(session) = session {
                    if !scope.owns(session.user_id) {
                        return Err(Error::Forbidden("session belongs to another scope".into()));
                    }
                }
            }
            None => {
                if let Some(sid) = patch.session_id.as_deref().filter(|s| !s.is_empty()) {
                    if let Some(session) = Self::find_session_conn(&conn, scope, sid)? {
                        message.chat_session_id = Some(session.id);
                    }
                }
            }
        }

        if let Some(content) = patch.content {
            message.content = content;
        }
        if let Some(tool_calls) = patch.tool_calls {
            message.tool_calls = tool_calls;
        }
        if let Some(iterations) = patch.iterations {
            message.iterations = iterations;
        }
        if let Some(metadata) = patch.metadata {
            message.metadata = metadata;
        }

        conn.execute(
            "UPDATE messages SET chat_session_id = ?1, content = ?2, tool_calls = ?3, \
             iterations = ?4, metadata = ?5 WHERE id = ?6",
            params![
                message.chat_session_id,
                message.content,
                json_text(&message.tool_calls),
                message.iterations,
                json_text(&message.metadata),
                message.id
            ],
        )
        .map_err(db_err)?;
        Ok(message)
    }

    /// Remove the newest message of a session. Ties on `created_at` break
    /// toward the higher rowid, so the latest insert always pops first.
    /// Returns `Ok(None)` when the session has no messages.
    pub async fn pop_last_message(
        &self,
        scope: ActorScope,
        session_id: &str,
    ) -> Result<Option<MessageRecord>> {
        let conn = self.conn.lock().await;
        let session = Self::find_session_conn(&conn, scope, session_id)?
            .ok_or_else(|| Error::NotFound("session not found".into()))?;
        let last = conn
            .query_row(
                &format!(
                    "{SELECT_MESSAGE} WHERE chat_session_id = ?1 \
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![session.id],
                row_to_message,
            )
            .optional()
            .map_err(db_err)?;
        match last {
            Some(message) => {
                conn.execute("DELETE FROM messages WHERE id = ?1", params![message.id])
                    .map_err(db_err)?;
                tracing::debug!(
                    session_id = %session.session_id,
                    message_id = message.id,
                    "last message removed"
                );
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    /// Delete the messages of one session, or of every in-scope session,
    /// and reset the affected watermarks. Returns the number of deleted
    /// messages.
    pub async fn clear_messages(
        &self,
        scope: ActorScope,
        session_id: Option<&str>,
    ) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(db_err)?;
        let deleted = match session_id {
            Some(sid) => {
                let session = Self::find_session_conn(&tx, scope, sid)?
                    .ok_or_else(|| Error::NotFound("session not found".into()))?;
                Self::clear_session_conn(&tx, &session)?
            }
            None => {
                let sessions = Self::list_sessions_conn(&tx, scope)?;
                let mut total = 0usize;
                for session in &sessions {
                    total += Self::clear_session_conn(&tx, session)?;
                }
                total
            }
        };
        tx.commit().map_err(db_err)?;
        tracing::info!(deleted, scope = ?scope, "messages cleared");
        Ok(deleted)
    }

    // ── connection-level helpers ────────────────────────────────────────

    fn find_session_conn(
        conn: &Connection,
        scope: ActorScope,
        session_id: &str,
    ) -> Result<Option<SessionRecord>> {
        conn.query_row(
            &format!("{SELECT_SESSION} WHERE session_id = ?1 AND user_id IS ?2"),
            params![session_id, scope.user_id()],
            row_to_session,
        )
        .optional()
        .map_err(db_err)
    }

    fn get_session_conn(conn: &Connection, scope: ActorScope, id: i64) -> Result<SessionRecord> {
        let session = conn
            .query_row(&format!("{SELECT_SESSION} WHERE id = ?1"), params![id], row_to_session)
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| Error::NotFound("session not found".into()))?;
        if !scope.owns(session.user_id) {
            return Err(Error::Forbidden("session belongs to another scope".into()));
        }
        Ok(session)
    }

    fn list_sessions_conn(conn: &Connection, scope: ActorScope) -> Result<Vec<SessionRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_SESSION} WHERE user_id IS ?1 ORDER BY updated_at DESC, id DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![scope.user_id()], row_to_session)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    fn resolve_session_conn(
        conn: &Connection,
        scope: ActorScope,
        session_id: Option<&str>,
        attrs: &SessionAttributes,
    ) -> Result<(SessionRecord, bool)> {
        if let Some(sid) = session_id {
            if let Some(existing) = Self::find_session_conn(conn, scope, sid)? {
                let session = Self::merge_session_conn(conn, &existing, attrs)?;
                return Ok((session, false));
            }
        }
        Ok((Self::insert_session_conn(conn, scope, attrs, session_id)?, true))
    }

    /// Merge `attrs` into `session`, writing only when something changed.
    fn merge_session_conn(
        conn: &Connection,
        session: &SessionRecord,
        attrs: &SessionAttributes,
    ) -> Result<SessionRecord> {
        let changes = resolver::session_changes(session, attrs);
        if changes.is_empty() {
            return Ok(session.clone());
        }
        Self::apply_changes_conn(conn, session, &changes)
    }

    fn apply_changes_conn(
        conn: &Connection,
        session: &SessionRecord,
        changes: &SessionChanges,
    ) -> Result<SessionRecord> {
        let mut updated = session.clone();
        if let Some(name) = &changes.name {
            updated.name = name.clone();
        }
        if let Some(device_id) = &changes.device_id {
            updated.device_id = Some(device_id.clone());
        }
        if let Some(provider) = &changes.provider {
            updated.provider = Some(provider.clone());
        }
        if let Some(model) = &changes.model {
            updated.model = Some(model.clone());
        }
        if let Some(metadata) = &changes.metadata {
            updated.metadata = Some(metadata.clone());
        }
        if let Some(ts) = changes.last_message_at {
            updated.last_message_at = Some(ts);
        }
        updated.updated_at = Utc::now();
        conn.execute(
            "UPDATE sessions SET name = ?1, device_id = ?2, provider = ?3, model = ?4, \
             metadata = ?5, last_message_at = ?6, updated_at = ?7 WHERE id = ?8",
            params![
                updated.name,
                updated.device_id,
                updated.provider,
                updated.model,
                json_text(&updated.metadata),
                updated.last_message_at.map(fmt_ts),
                fmt_ts(updated.updated_at),
                updated.id
            ],
        )
        .map_err(db_err)?;
        Ok(updated)
    }

    fn insert_session_conn(
        conn: &Connection,
        scope: ActorScope,
        attrs: &SessionAttributes,
        session_id: Option<&str>,
    ) -> Result<SessionRecord> {
        let now = Utc::now();
        let sid = match session_id {
            Some(s) => s.to_owned(),
            None => resolver::new_session_id(),
        };
        let name = attrs
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| resolver::default_session_name(chrono::Local::now()));
        conn.execute(
            "INSERT INTO sessions (session_id, name, user_id, device_id, provider, model, \
             metadata, last_message_at, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?8)",
            params![
                sid,
                name,
                scope.user_id(),
                attrs.device_id,
                attrs.provider,
                attrs.model,
                json_text(&attrs.metadata),
                fmt_ts(now)
            ],
        )
        .map_err(db_err)?;
        Ok(SessionRecord {
            id: conn.last_insert_rowid(),
            session_id: sid,
            name,
            user_id: scope.user_id(),
            device_id: attrs.device_id.clone(),
            provider: attrs.provider.clone(),
            model: attrs.model.clone(),
            metadata: attrs.metadata.clone(),
            last_message_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn insert_message_conn(
        conn: &Connection,
        scope: ActorScope,
        session_rowid: Option<i64>,
        message: &NewMessage,
    ) -> Result<MessageRecord> {
        let now = Utc::now();
        conn.execute(
            "INSERT INTO messages (chat_session_id, user_id, role, content, tool_calls, \
             iterations, device_id, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session_rowid,
                scope.user_id(),
                message.role.as_str(),
                message.content,
                json_text(&message.tool_calls),
                message.iterations,
                message.device_id,
                json_text(&message.metadata),
                fmt_ts(now)
            ],
        )
        .map_err(db_err)?;
        Ok(MessageRecord {
            id: conn.last_insert_rowid(),
            chat_session_id: session_rowid,
            user_id: scope.user_id(),
            role: message.role,
            content: message.content.clone(),
            tool_calls: message.tool_calls.clone(),
            iterations: message.iterations,
            device_id: message.device_id.clone(),
            metadata: message.metadata.clone(),
            created_at: now,
        })
    }

    fn messages_for_conn(conn: &Connection, session_rowid: i64) -> Result<Vec<MessageRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_MESSAGE} WHERE chat_session_id = ?1 ORDER BY created_at ASC, id ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![session_rowid], row_to_message)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    fn clear_session_conn(conn: &Connection, session: &SessionRecord) -> Result<usize> {
        let deleted = conn
            .execute("DELETE FROM messages WHERE chat_session_id = ?1", params![session.id])
            .map_err(db_err)?;
        conn.execute(
            "UPDATE sessions SET last_message_at = NULL, updated_at = ?1 WHERE id = ?2",
            params![fmt_ts(Utc::now()), session.id],
        )
        .map_err(db_err)?;
        Ok(deleted)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row mapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let metadata: Option<String> = row.get(7)?;
    let last_message_at: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        name: row.get(2)?,
        user_id: row.get(3)?,
        device_id: row.get(4)?,
        provider: row.get(5)?,
        model: row.get(6)?,
        metadata: parse_json(metadata, 7)?,
        last_message_at: match last_message_at {
            Some(raw) => Some(parse_ts(&raw, 8)?),
            None => None,
        },
        created_at: parse_ts(&created_at, 9)?,
        updated_at: parse_ts(&updated_at, 10)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let role: String = row.get(3)?;
    let role = Role::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown role '{role}'").into(),
        )
    })?;
    let tool_calls: Option<String> = row.get(5)?;
    let metadata: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    Ok(MessageRecord {
        id: row.get(0)?,
        chat_session_id: row.get(1)?,
        user_id: row.get(2)?,
        role,
        content: row.get(4)?,
        tool_calls: parse_json(tool_calls, 5)?,
        iterations: row.get(6)?,
        device_id: row.get(7)?,
        metadata: parse_json(metadata, 8)?,
        created_at: parse_ts(&created_at, 9)?,
    })
}

fn db_err(err: rusqlite::Error) -> Error {
    Error::Storage(err.to_string())
}

/// Fixed microsecond precision keeps the stored text the same width for
/// every row, which the ordering queries rely on.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json(raw: Option<String>, idx: usize) -> rusqlite::Result<Option<Value>> {
    match raw {
        Some(s) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn json_text(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(Value::to_string)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolve_creates_then_finds() {
        let store = HistoryStore::in_memory().unwrap();
        let scope = ActorScope::Anonymous;
        let created = store
            .resolve_session(scope, Some("sess-1"), &SessionAttributes::default())
            .await
            .unwrap();
        assert_eq!(created.session_id, "sess-1");
        assert!(created.name.starts_with("Session "));

        let found = store.find_session(scope, "sess-1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn timestamps_survive_storage() {
        let store = HistoryStore::in_memory().unwrap();
        let scope = ActorScope::User(7);
        let created = store
            .resolve_session(scope, Some("ts"), &SessionAttributes::default())
            .await
            .unwrap();
        let found = store.find_session(scope, "ts").await.unwrap().unwrap();
        assert_eq!(
            fmt_ts(found.created_at),
            fmt_ts(created.created_at),
            "stored text must round-trip at microsecond precision"
        );
    }

    #[tokio::test]
    async fn messages_default_to_empty() {
        let store = HistoryStore::in_memory().unwrap();
        let scope = ActorScope::Anonymous;
        let session = store
            .resolve_session(scope, Some("empty"), &SessionAttributes::default())
            .await
            .unwrap();
        assert!(store.messages_in(&session).await.unwrap().is_empty());
        assert!(store.session_messages(scope, "unknown").await.unwrap().is_empty());
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let patch: MessagePatch = serde_json::from_value(json!({"content": null})).unwrap();
        assert_eq!(patch.content, Some(None));
        assert_eq!(patch.tool_calls, None);

        let patch: MessagePatch = serde_json::from_value(json!({"content": "hi"})).unwrap();
        assert_eq!(patch.content, Some(Some("hi".into())));
    }
}
