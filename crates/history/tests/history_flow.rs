//! End-to-end store flows: resolution, appends, sync, patching, pruning.

use std::time::Duration;

use cb_domain::{ActorScope, Error};
use cb_history::{
    AppendPair, HistoryStore, IncomingMessage, MessagePatch, Role, SessionAttributes,
};

fn pair(session_id: Option<&str>) -> AppendPair {
    AppendPair {
        session_id: session_id.map(str::to_owned),
        session_name: Some("Test chat".into()),
        device_id: Some("dev-1".into()),
        user_content: "hello".into(),
        assistant_content: Some("hi there".into()),
        ..Default::default()
    }
}

fn item(role: &str, content: &str) -> IncomingMessage {
    IncomingMessage {
        role: role.into(),
        content: Some(content.into()),
        tool_calls: None,
        metadata: None,
    }
}

/// Timestamps carry microsecond precision; a short pause guarantees two
/// writes land on different instants when a test depends on time order.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(2)).await;
}

// ── appends ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_pair_creates_session_and_both_rows() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;

    let outcome = store.append_pair(scope, pair(None)).await.unwrap();
    assert_eq!(outcome.session.name, "Test chat");
    assert_eq!(outcome.session.session_id.len(), 36, "minted ids are UUIDs");
    assert!(outcome.session.last_message_at.is_some(), "watermark advances on append");

    assert_eq!(outcome.user_message.role, Role::User);
    assert_eq!(outcome.user_message.content.as_deref(), Some("hello"));
    assert_eq!(outcome.assistant_message.role, Role::Assistant);
    assert_eq!(outcome.assistant_message.content.as_deref(), Some("hi there"));

    let messages = store.messages_in(&outcome.session).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, outcome.user_message.id);
    assert_eq!(messages[1].id, outcome.assistant_message.id);
}

#[tokio::test]
async fn append_pair_reuses_existing_session() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::User(1);

    let first = store
        .resolve_session(scope, Some("s1"), &SessionAttributes::default())
        .await
        .unwrap();

    let mut request = pair(Some("s1"));
    request.model = Some("gpt-4o".into());
    let outcome = store.append_pair(scope, request).await.unwrap();

    assert_eq!(outcome.session.id, first.id);
    assert_eq!(outcome.session.model.as_deref(), Some("gpt-4o"));
    assert_eq!(store.messages_in(&outcome.session).await.unwrap().len(), 2);
}

#[tokio::test]
async fn append_pair_defaults_missing_assistant_content() {
    let store = HistoryStore::in_memory().unwrap();
    let mut request = pair(None);
    request.assistant_content = None;
    let outcome = store.append_pair(ActorScope::Anonymous, request).await.unwrap();
    assert_eq!(outcome.assistant_message.content.as_deref(), Some(""));
}

// ── resolution ──────────────────────────────────────────────────────────

#[tokio::test]
async fn unchanged_re_resolve_performs_no_write() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::User(3);
    let attrs = SessionAttributes {
        name: Some("Kitchen planning".into()),
        provider: Some("openai".into()),
        ..Default::default()
    };

    store.resolve_session(scope, Some("idem"), &attrs).await.unwrap();
    tick().await;
    let second = store.resolve_session(scope, Some("idem"), &attrs).await.unwrap();
    tick().await;
    let third = store.resolve_session(scope, Some("idem"), &attrs).await.unwrap();

    // Both re-resolves return the stored row untouched.
    assert_eq!(third.updated_at, second.updated_at);
    assert_eq!(third.name, "Kitchen planning");

    tick().await;
    let renamed = store
        .resolve_session(
            scope,
            Some("idem"),
            &SessionAttributes {
                name: Some("Bathroom planning".into()),
                ..attrs
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Bathroom planning");
    assert!(renamed.updated_at > third.updated_at);
}

#[tokio::test]
async fn metadata_accumulates_across_resolves() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;

    store
        .resolve_session(
            scope,
            Some("meta"),
            &SessionAttributes {
                metadata: Some(serde_json::json!({"a": 1})),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let merged = store
        .resolve_session(
            scope,
            Some("meta"),
            &SessionAttributes {
                metadata: Some(serde_json::json!({"b": 2})),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(merged.metadata, Some(serde_json::json!({"a": 1, "b": 2})));

    let stored = store.find_session(scope, "meta").await.unwrap().unwrap();
    assert_eq!(stored.metadata, Some(serde_json::json!({"a": 1, "b": 2})));
}

// ── scoping ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn scopes_never_see_each_other() {
    let store = HistoryStore::in_memory().unwrap();
    let alice = ActorScope::User(1);
    let bob = ActorScope::User(2);

    store.append_pair(alice, pair(Some("alice-chat"))).await.unwrap();

    assert!(store.find_session(bob, "alice-chat").await.unwrap().is_none());
    assert!(store.list_sessions(bob).await.unwrap().is_empty());
    assert!(store.session_messages(bob, "alice-chat").await.unwrap().is_empty());
    assert!(store.list_sessions(ActorScope::Anonymous).await.unwrap().is_empty());

    assert_eq!(store.list_sessions(alice).await.unwrap().len(), 1);
}

#[tokio::test]
async fn get_session_distinguishes_missing_from_foreign() {
    let store = HistoryStore::in_memory().unwrap();
    let session = store
        .create_session(ActorScope::User(1), &SessionAttributes::default(), Some("owned"))
        .await
        .unwrap();

    let err = store.get_session(ActorScope::User(2), session.id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let err = store.get_session(ActorScope::User(1), 9999).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ── bulk sync ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_inserts_in_request_order() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;

    let (session, created) = store
        .sync_messages(
            scope,
            "sync-1",
            vec![item("user", "q"), item("assistant", "a"), item("system", "note")],
        )
        .await
        .unwrap();
    assert_eq!(created, 3);
    assert!(session.last_message_at.is_some());

    let messages = store.session_messages(scope, "sync-1").await.unwrap();
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::System]);
    assert_eq!(messages[2].content.as_deref(), Some("note"));
}

#[tokio::test]
async fn sync_rejects_whole_batch_on_bad_role() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;
    store
        .sync_messages(scope, "sync-2", vec![item("user", "first")])
        .await
        .unwrap();

    let err = store
        .sync_messages(scope, "sync-2", vec![item("user", "ok"), item("tool", "nope")])
        .await
        .unwrap_err();
    match err {
        Error::Validation { field, .. } => assert_eq!(field, "messages[1].role"),
        other => panic!("expected validation error, got {other:?}"),
    }

    // nothing from the rejected batch may land
    assert_eq!(store.session_messages(scope, "sync-2").await.unwrap().len(), 1);
}

// ── partial updates ─────────────────────────────────────────────────────

#[tokio::test]
async fn patch_touches_only_named_fields() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;
    let outcome = store.append_pair(scope, pair(Some("patch"))).await.unwrap();

    let updated = store
        .update_message(
            scope,
            outcome.assistant_message.id,
            MessagePatch {
                content: Some(Some("revised".into())),
                iterations: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.content.as_deref(), Some("revised"));
    assert_eq!(updated.iterations, 4);
    assert_eq!(updated.tool_calls, outcome.assistant_message.tool_calls);
    assert_eq!(updated.metadata, outcome.assistant_message.metadata);

    // explicit null clears the column
    let cleared = store
        .update_message(
            scope,
            outcome.assistant_message.id,
            MessagePatch {
                content: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.content, None);
    assert_eq!(cleared.iterations, 4);
}

#[tokio::test]
async fn patch_attaches_detached_message_when_session_known() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;
    store
        .resolve_session(scope, Some("attach-here"), &SessionAttributes::default())
        .await
        .unwrap();
    let loose = store
        .insert_message(
            scope,
            None,
            &cb_history::NewMessage {
                role: Role::User,
                content: Some("floating".into()),
                tool_calls: None,
                iterations: 0,
                device_id: None,
                metadata: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(loose.chat_session_id, None);

    let updated = store
        .update_message(
            scope,
            loose.id,
            MessagePatch {
                session_id: Some("attach-here".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.chat_session_id.is_some());

    let messages = store.session_messages(scope, "attach-here").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content.as_deref(), Some("floating"));
}

#[tokio::test]
async fn patch_skips_unknown_attachment_but_still_applies() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;
    let loose = store
        .insert_message(
            scope,
            None,
            &cb_history::NewMessage {
                role: Role::User,
                content: None,
                tool_calls: None,
                iterations: 0,
                device_id: None,
                metadata: None,
            },
        )
        .await
        .unwrap();

    let updated = store
        .update_message(
            scope,
            loose.id,
            MessagePatch {
                session_id: Some("nowhere".into()),
                content: Some(Some("still applied".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.chat_session_id, None);
    assert_eq!(updated.content.as_deref(), Some("still applied"));
}

#[tokio::test]
async fn patch_enforces_ownership_and_existence() {
    let store = HistoryStore::in_memory().unwrap();
    let outcome = store.append_pair(ActorScope::User(1), pair(Some("owned"))).await.unwrap();

    let err = store
        .update_message(ActorScope::User(2), outcome.user_message.id, MessagePatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let err = store
        .update_message(ActorScope::User(1), 9999, MessagePatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ── pop and clear ───────────────────────────────────────────────────────

#[tokio::test]
async fn pop_removes_newest_first() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;
    store
        .sync_messages(
            scope,
            "pop",
            vec![item("user", "m1"), item("assistant", "m2"), item("user", "m3")],
        )
        .await
        .unwrap();

    // same-instant rows break ties toward the higher rowid
    let popped = store.pop_last_message(scope, "pop").await.unwrap().unwrap();
    assert_eq!(popped.content.as_deref(), Some("m3"));
    let popped = store.pop_last_message(scope, "pop").await.unwrap().unwrap();
    assert_eq!(popped.content.as_deref(), Some("m2"));
    store.pop_last_message(scope, "pop").await.unwrap().unwrap();

    assert!(store.pop_last_message(scope, "pop").await.unwrap().is_none());

    let err = store.pop_last_message(scope, "missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn clear_resets_watermark() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;
    let outcome = store.append_pair(scope, pair(Some("wipe"))).await.unwrap();
    assert!(outcome.session.last_message_at.is_some());

    let deleted = store.clear_messages(scope, Some("wipe")).await.unwrap();
    assert_eq!(deleted, 2);

    let session = store.find_session(scope, "wipe").await.unwrap().unwrap();
    assert_eq!(session.last_message_at, None, "watermark resets with the messages");
    assert!(store.messages_in(&session).await.unwrap().is_empty());

    let err = store.clear_messages(scope, Some("missing")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn clear_all_stays_inside_scope() {
    let store = HistoryStore::in_memory().unwrap();
    let alice = ActorScope::User(1);
    let bob = ActorScope::User(2);

    store.append_pair(alice, pair(Some("a1"))).await.unwrap();
    store
        .sync_messages(alice, "a2", vec![item("user", "x"), item("assistant", "y")])
        .await
        .unwrap();
    store.sync_messages(bob, "b1", vec![item("user", "keep me")]).await.unwrap();

    let deleted = store.clear_messages(alice, None).await.unwrap();
    assert_eq!(deleted, 4);

    assert!(store.session_messages(alice, "a1").await.unwrap().is_empty());
    assert!(store.session_messages(alice, "a2").await.unwrap().is_empty());
    assert_eq!(store.session_messages(bob, "b1").await.unwrap().len(), 1);
}

// ── listing and paging ──────────────────────────────────────────────────

#[tokio::test]
async fn list_orders_by_recent_activity() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;

    store.resolve_session(scope, Some("older"), &SessionAttributes::default()).await.unwrap();
    tick().await;
    store.resolve_session(scope, Some("newer"), &SessionAttributes::default()).await.unwrap();
    tick().await;
    store.append_pair(scope, pair(Some("older"))).await.unwrap();

    let sessions = store.list_sessions(scope).await.unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, vec!["older", "newer"], "touched session moves to the front");
}

#[tokio::test]
async fn history_caps_results_and_rejects_unknown_session() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;
    store
        .sync_messages(
            scope,
            "long",
            (1..=5).map(|i| item("user", &format!("m{i}"))).collect(),
        )
        .await
        .unwrap();

    let capped = store.history_messages(scope, None, 3).await.unwrap();
    assert_eq!(capped.len(), 3);
    assert_eq!(capped[0].content.as_deref(), Some("m1"));

    let scoped = store.history_messages(scope, Some("long"), 100).await.unwrap();
    assert_eq!(scoped.len(), 5);

    let err = store.history_messages(scope, Some("missing"), 100).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn recent_returns_newest_in_chronological_order() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;
    store
        .sync_messages(
            scope,
            "ctx",
            (1..=5).map(|i| item("user", &format!("m{i}"))).collect(),
        )
        .await
        .unwrap();

    let recent = store.recent_messages(scope, 3).await.unwrap();
    let contents: Vec<&str> =
        recent.iter().filter_map(|m| m.content.as_deref()).collect();
    assert_eq!(contents, vec!["m3", "m4", "m5"]);
}

// ── lifecycle ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_rejects_duplicate_identifier() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::Anonymous;
    store.create_session(scope, &SessionAttributes::default(), Some("dup")).await.unwrap();
    let err = store
        .create_session(scope, &SessionAttributes::default(), Some("dup"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}

#[tokio::test]
async fn rename_and_delete_round_trip() {
    let store = HistoryStore::in_memory().unwrap();
    let scope = ActorScope::User(3);
    let outcome = store.append_pair(scope, pair(Some("doomed"))).await.unwrap();

    let renamed = store.rename_session(scope, outcome.session.id, "Renamed").await.unwrap();
    assert_eq!(renamed.name, "Renamed");
    assert_eq!(store.get_session(scope, outcome.session.id).await.unwrap().name, "Renamed");

    store.delete_session(scope, outcome.session.id).await.unwrap();
    let err = store.get_session(scope, outcome.session.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(store.session_messages(scope, "doomed").await.unwrap().is_empty());
}

#[tokio::test]
async fn reopen_preserves_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");
    let scope = ActorScope::Anonymous;

    {
        let store = HistoryStore::open(&path).unwrap();
        store.append_pair(scope, pair(Some("durable"))).await.unwrap();
    }

    let store = HistoryStore::open(&path).unwrap();
    let session = store.find_session(scope, "durable").await.unwrap().unwrap();
    assert_eq!(session.name, "Test chat");
    assert_eq!(store.messages_in(&session).await.unwrap().len(), 2);
}
