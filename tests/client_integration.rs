//! Drives a client against a scripted in-memory server: inbound events
//! flow through the serve loop into the store, and the stream ending takes
//! the client offline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use communique::client::{InboundEvent, InboundHandler, Protocol, RosterFetch, Session, Stanza, StaticSecret};
use communique::{Client, ConnState, UiEvent, UiHandle};
use communique_store::{ChatMessage, Jid, MessageType, RosterItem, StanzaId, Store, Subscription};
use futures_util::stream;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Replays `script` to the handler once released, then ends the stream.
struct ScriptedSession {
    script: Vec<InboundEvent>,
    release: Arc<Notify>,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn send(&self, _stanza: Stanza) -> anyhow::Result<()> {
        Ok(())
    }

    async fn serve(&self, handler: Arc<dyn InboundHandler>) -> anyhow::Result<()> {
        self.release.notified().await;
        for event in self.script.clone() {
            handler.handle(event).await;
        }
        anyhow::bail!("end of script")
    }

    fn set_close_deadline(&self, _deadline: Instant) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn fetch_roster(&self, _ver: &str) -> anyhow::Result<RosterFetch> {
        Ok(RosterFetch {
            ver: None,
            items: Box::pin(stream::empty()),
        })
    }
}

struct ScriptedServer {
    script: Vec<InboundEvent>,
    release: Arc<Notify>,
}

#[async_trait]
impl Protocol for ScriptedServer {
    type Conn = ();

    async fn dial(&self, _addr: &Jid) -> anyhow::Result<()> {
        Ok(())
    }

    async fn negotiate(&self, _conn: (), _addr: &Jid, _password: &str) -> anyhow::Result<Arc<dyn Session>> {
        Ok(Arc::new(ScriptedSession {
            script: self.script.clone(),
            release: self.release.clone(),
        }))
    }
}

fn me() -> Jid {
    "me@example.com".parse().unwrap()
}

fn archived(id: &str, secs: i64) -> InboundEvent {
    InboundEvent::Archived {
        archive: me(),
        msg: ChatMessage {
            from: "juliet@example.com/balcony".parse().unwrap(),
            to: me(),
            id: id.into(),
            body: format!("body {id}"),
            msg_type: MessageType::Chat,
            delay: Some(Utc.timestamp_opt(secs, 0).unwrap()),
            stanza_ids: vec![StanzaId::new(format!("a-{id}"), me())],
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn inbound_stream_is_stored_then_client_goes_offline() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open_path(&dir.path().join("me.db")).unwrap());
    let juliet = RosterItem::new("juliet@example.com".parse().unwrap(), "Juliet", Subscription::Both);

    let script = vec![
        InboundEvent::RosterPush {
            ver: Some("v2".into()),
            item: juliet.clone(),
        },
        archived("m2", 200),
        archived("m1", 100),
        // Duplicate delivery of the same archived message.
        archived("m1", 100),
    ];

    let release = Arc::new(Notify::new());
    let (ui, mut events) = UiHandle::channel();
    let client = Client::new(
        me(),
        Duration::from_secs(5),
        ScriptedServer {
            script,
            release: release.clone(),
        },
        Arc::new(StaticSecret::new("pw")),
        store.clone(),
        ui,
    );
    client.online().await.unwrap();
    assert_eq!(client.state(), ConnState::Online);
    release.notify_one();

    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            let done = event == UiEvent::Offline && !seen.is_empty();
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    let online = seen.iter().position(|e| *e == UiEvent::Online).unwrap();
    let offline = seen.iter().rposition(|e| *e == UiEvent::Offline).unwrap();
    assert!(online < offline, "presence confirmed after going offline: {seen:?}");
    assert!(!seen[offline + 1..].iter().any(|e| matches!(e, UiEvent::Online | UiEvent::Away | UiEvent::Busy)));
    assert!(seen.contains(&UiEvent::UpdateRoster(juliet.clone())));
    assert!(seen.iter().any(|e| matches!(e, UiEvent::Error(_))));
    assert_eq!(client.state(), ConnState::Offline);

    assert_eq!(store.roster_version().unwrap(), "v2");
    let history = store
        .query_history(&juliet.jid, None)
        .collect_all()
        .unwrap();
    let bodies: Vec<_> = history.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["body m1", "body m2"]);

    let cursors = store.after_id().collect_all().unwrap();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0].archive_id, "a-m2");
}
