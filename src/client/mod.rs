//! The connection controller.
//!
//! Owns the single session to the server. Presence changes reconnect on
//! demand; a background task serves the inbound stream and demotes the
//! client to offline when the stream ends, and another refreshes the roster
//! after every connect.

pub mod error;
pub mod handler;
pub mod roster;
pub mod secret;
pub mod traits;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use communique_store::{ChatMessage, Jid, MessageType, Store};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use error::ClientError;
pub use handler::StoreHandler;
pub use secret::{CommandSecret, StaticSecret};
pub use traits::{InboundEvent, InboundHandler, Protocol, RosterFetch, SecretSource, Session, Show, Stanza};

use crate::ui::{UiEvent, UiHandle};

/// How long a graceful close may take before the stream is torn down.
const CLOSE_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Offline,
    Online,
}

/// Cheap to clone; clones share the same session.
pub struct Client<P: Protocol> {
    inner: Arc<Inner<P>>,
}

impl<P: Protocol> Clone for Client<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<P: Protocol> {
    account: Jid,
    timeout: Duration,
    protocol: P,
    secret: Arc<dyn SecretSource>,
    store: Arc<Store>,
    ui: UiHandle,
    handler: Arc<dyn InboundHandler>,
    online: AtomicBool,
    /// Bumped on every successful connect so the exit of an old serve loop
    /// cannot take down a newer session.
    generation: AtomicU64,
    /// The live session and its generation. Held across reconnects so only
    /// one reconnect runs at a time.
    session: Mutex<Option<(u64, Arc<dyn Session>)>>,
}

impl<P: Protocol> Client<P> {
    /// Create an offline client. Nothing is dialed until a presence change.
    pub fn new(
        account: Jid,
        timeout: Duration,
        protocol: P,
        secret: Arc<dyn SecretSource>,
        store: Arc<Store>,
        ui: UiHandle,
    ) -> Self {
        let handler = Arc::new(StoreHandler::new(store.clone(), account.clone(), ui.clone()));
        info!("User address: {account}");
        ui.send(UiEvent::Offline);
        Self {
            inner: Arc::new(Inner {
                account,
                timeout,
                protocol,
                secret,
                store,
                ui,
                handler,
                online: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnState {
        if self.inner.online.load(Ordering::Acquire) {
            ConnState::Online
        } else {
            ConnState::Offline
        }
    }

    pub fn account(&self) -> &Jid {
        &self.inner.account
    }

    pub async fn online(&self) -> Result<(), ClientError> {
        self.presence(Show::Available).await
    }

    pub async fn away(&self) -> Result<(), ClientError> {
        self.presence(Show::Away).await
    }

    pub async fn busy(&self) -> Result<(), ClientError> {
        self.presence(Show::Busy).await
    }

    /// Log off. Always ends Offline locally, whatever the server says.
    pub async fn offline(&self) {
        let mut slot = self.inner.session.lock().await;
        let Some((generation, session)) = slot.take() else {
            debug!("Already offline");
            return;
        };
        self.inner.online.store(false, Ordering::Release);

        if let Err(e) = session.set_close_deadline(Instant::now() + CLOSE_GRACE) {
            debug!("Error setting close deadline: {e:#}");
        }
        match session.close().await {
            Ok(()) => info!("Logged off (session {generation})"),
            Err(e) => warn!("Error logging off: {e:#}"),
        }
        drop(slot);
        self.inner.ui.send(UiEvent::Offline);
    }

    /// Send a chat message and record it as sent. Does not reconnect.
    pub async fn send_message(&self, to: Jid, body: impl Into<String>) -> Result<ChatMessage, ClientError> {
        let session = self.current_session().await.ok_or(ClientError::NotConnected)?;

        let id = uuid::Uuid::new_v4().to_string();
        let msg = ChatMessage {
            sent: true,
            to,
            from: self.inner.account.clone(),
            id: id.clone(),
            origin_id: Some(id),
            body: body.into(),
            msg_type: MessageType::Chat,
            delay: None,
            stanza_ids: Vec::new(),
        };
        self.send(&session, Stanza::Message(msg.clone()), "message").await?;

        let store = self.inner.store.clone();
        let account = self.inner.account.clone();
        let stored = msg.clone();
        tokio::task::spawn_blocking(move || store.insert_message(&stored, false, &account)).await??;
        Ok(msg)
    }

    async fn presence(&self, show: Show) -> Result<(), ClientError> {
        let (generation, session) = self.reconnect().await.inspect_err(|e| warn!("{e}"))?;

        // The session may still be usable after a failed send, so the
        // state is left alone.
        self.send(&session, Stanza::Presence(show), "presence")
            .await
            .inspect_err(|e| warn!("{e}"))?;

        // Confirm under the session lock: once the serve loop has cleared
        // the slot it owns the Offline event, and nothing may follow it.
        let slot = self.inner.session.lock().await;
        if !matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
            warn!("Session {generation} ended before presence was confirmed");
            return Err(ClientError::NotConnected);
        }
        self.inner.ui.send(match show {
            Show::Available => UiEvent::Online,
            Show::Away => UiEvent::Away,
            Show::Busy => UiEvent::Busy,
        });
        drop(slot);
        Ok(())
    }

    async fn send(&self, session: &Arc<dyn Session>, stanza: Stanza, what: &'static str) -> Result<(), ClientError> {
        tokio::time::timeout(self.inner.timeout, session.send(stanza))
            .await
            .map_err(|_| ClientError::Timeout("sending"))?
            .map_err(|err| ClientError::Send { what, err })
    }

    async fn current_session(&self) -> Option<Arc<dyn Session>> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|(_, session)| session.clone())
    }

    /// Return the live session and its generation, establishing one first
    /// if offline.
    async fn reconnect(&self) -> Result<(u64, Arc<dyn Session>), ClientError> {
        let inner = &self.inner;
        let mut slot = inner.session.lock().await;
        if let Some((generation, session)) = slot.as_ref() {
            return Ok((*generation, session.clone()));
        }

        let password = inner.secret.password().await.map_err(ClientError::Credentials)?;

        let session = tokio::time::timeout(inner.timeout, async {
            let conn = inner
                .protocol
                .dial(&inner.account)
                .await
                .map_err(ClientError::Dial)?;
            inner
                .protocol
                .negotiate(conn, &inner.account, &password)
                .await
                .map_err(ClientError::Negotiate)
        })
        .await
        .map_err(|_| ClientError::Timeout("connecting"))??;

        let generation = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *slot = Some((generation, session.clone()));
        inner.online.store(true, Ordering::Release);
        info!("Session {generation} established for {}", inner.account);

        tokio::spawn(serve(inner.clone(), generation, session.clone()));

        let (store, ui, timeout) = (inner.store.clone(), inner.ui.clone(), inner.timeout);
        let roster_session = session.clone();
        tokio::spawn(async move {
            if let Err(e) = roster::refresh(roster_session, store, ui.clone(), timeout).await {
                warn!("{e}");
                ui.send(UiEvent::Error(e.to_string()));
            }
        });

        Ok((generation, session))
    }
}

/// Serve the inbound stream until it ends, then go offline if this is
/// still the current session.
async fn serve<P: Protocol>(inner: Arc<Inner<P>>, generation: u64, session: Arc<dyn Session>) {
    let result = session.serve(inner.handler.clone()).await;

    let mut slot = inner.session.lock().await;
    if !matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
        debug!("Stream of old session {generation} ended");
        return;
    }
    *slot = None;
    inner.online.store(false, Ordering::Release);
    drop(slot);

    match result {
        Ok(()) => info!("Stream closed by server"),
        Err(e) => {
            warn!("Error while handling XMPP streams: {e:#}");
            inner.ui.send(UiEvent::Error(format!("{e:#}")));
        }
    }
    inner.ui.send(UiEvent::Offline);
}
