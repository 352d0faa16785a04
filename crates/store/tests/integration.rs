//! End-to-end checks against a store opened through the public API.

use chrono::{TimeZone, Utc};
use communique_store::{
    ChatMessage, MessageType, RosterItem, StanzaId, Store, StoreError, StoreOptions, Subscription,
};
use tempfile::TempDir;

fn open(dir: &TempDir) -> Store {
    let opts = StoreOptions::new("communique", "me@example.com")
        .with_db_file(dir.path().join("me@example.com.db"));
    Store::open(&opts).unwrap()
}

#[test]
fn data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let me = "me@example.com".parse().unwrap();
    {
        let store = open(&dir);
        store
            .replace_roster(
                Some("ver-7"),
                vec![RosterItem::new("juliet@example.com".parse().unwrap(), "Juliet", Subscription::Both)
                    .with_groups(["Capulet"])],
            )
            .unwrap();
        let msg = ChatMessage {
            from: "juliet@example.com/balcony".parse().unwrap(),
            to: "me@example.com".parse().unwrap(),
            id: "m1".into(),
            body: "wherefore".into(),
            msg_type: MessageType::Chat,
            delay: Some(Utc.timestamp_opt(1_000, 0).unwrap()),
            stanza_ids: vec![StanzaId::new("arch-1", "me@example.com".parse().unwrap())],
            ..Default::default()
        };
        store.insert_message(&msg, true, &me).unwrap();
    }

    let store = open(&dir);
    assert_eq!(store.roster_version().unwrap(), "ver-7");

    let item = store
        .roster_item(&"juliet@example.com".parse().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(item.groups, vec!["Capulet".to_string()]);

    let history = store
        .query_history(&"juliet@example.com".parse().unwrap(), Some(MessageType::Chat))
        .collect_all()
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body, "wherefore");

    let cursors = store.after_id().collect_all().unwrap();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0].archive_id, "arch-1");
}

#[test]
fn concurrent_writers_are_serialized() {
    let dir = TempDir::new().unwrap();
    let store = std::sync::Arc::new(open(&dir));
    let me: communique_store::Jid = "me@example.com".parse().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            let me = me.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    let msg = ChatMessage {
                        from: "juliet@example.com".parse().unwrap(),
                        to: me.clone(),
                        id: format!("t{t}-{i}"),
                        body: "x".into(),
                        delay: Some(Utc.timestamp_opt(i64::from(t * 100 + i), 0).unwrap()),
                        ..Default::default()
                    };
                    store.insert_message(&msg, true, &me).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let rows = store
        .query_history(&"juliet@example.com".parse().unwrap(), None)
        .collect_all()
        .unwrap();
    assert_eq!(rows.len(), 100);
    assert!(rows.windows(2).all(|w| w[0].delay <= w[1].delay));
}

#[test]
fn explicit_rollback_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store
        .write_tx(|tx| {
            communique_store::upsert_version(tx, "never")?;
            Err(StoreError::Rollback)
        })
        .unwrap();
    assert_eq!(store.roster_version().unwrap(), "");
}
