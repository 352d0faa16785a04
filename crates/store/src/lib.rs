//! Local-first persistence for the communique XMPP client.
//!
//! One SQLite database per account holds the roster, its version token and
//! the message history. Writes are serialized through a single connection;
//! history and cursor queries stream through [`RowIter`].

mod db;
pub mod error;
mod iter;
mod messages;
pub mod paths;
mod roster;
mod schema;
pub mod types;

pub use db::{Store, StoreOptions};
pub use error::{Result, StoreError};
pub use iter::RowIter;
pub use messages::InsertOutcome;
pub use roster::{upsert_item, upsert_version};
pub use types::{
    ArchiveCursor, ChatMessage, HistoryMessage, Jid, MessageType, RosterItem, StanzaId,
    Subscription,
};
