//! The seams between the client and the outside world: the XMPP
//! implementation, the password source, and whoever consumes inbound
//! stream events.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use communique_store::{ChatMessage, Jid, RosterItem};
use futures_util::stream::BoxStream;

/// The `<show/>` value of an available presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Show {
    Available,
    Away,
    /// Sent as `dnd`.
    Busy,
}

impl Show {
    /// The wire value, or `None` for a plain available presence.
    pub fn as_wire(&self) -> Option<&'static str> {
        match self {
            Show::Available => None,
            Show::Away => Some("away"),
            Show::Busy => Some("dnd"),
        }
    }
}

/// Outbound stanzas the client produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stanza {
    Presence(Show),
    Message(ChatMessage),
}

/// Inbound events decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A message delivered live.
    Message(ChatMessage),
    /// A message replayed from the archive kept by `archive`.
    Archived { archive: Jid, msg: ChatMessage },
    /// A delivery receipt for the message with this id.
    Receipt(String),
    /// A roster push.
    RosterPush { ver: Option<String>, item: RosterItem },
}

/// Result of a roster request. With a matching version the server may
/// answer "unchanged": no version and no items.
pub struct RosterFetch {
    pub ver: Option<String>,
    pub items: BoxStream<'static, anyhow::Result<RosterItem>>,
}

/// Establishes sessions. Stream negotiation (TLS, SASL, resource binding)
/// happens behind this trait.
#[async_trait]
pub trait Protocol: Send + Sync + 'static {
    type Conn: Send + 'static;

    async fn dial(&self, addr: &Jid) -> anyhow::Result<Self::Conn>;

    async fn negotiate(
        &self,
        conn: Self::Conn,
        addr: &Jid,
        password: &str,
    ) -> anyhow::Result<Arc<dyn Session>>;
}

/// A negotiated stream.
#[async_trait]
pub trait Session: Send + Sync {
    async fn send(&self, stanza: Stanza) -> anyhow::Result<()>;

    /// Feed inbound events to `handler` until the stream ends.
    async fn serve(&self, handler: Arc<dyn InboundHandler>) -> anyhow::Result<()>;

    fn set_close_deadline(&self, deadline: Instant) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;

    /// Request the roster, passing the version we already hold (may be empty).
    async fn fetch_roster(&self, ver: &str) -> anyhow::Result<RosterFetch>;
}

#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent);
}

/// Where the account password comes from. May prompt or run a command.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn password(&self) -> anyhow::Result<String>;
}
