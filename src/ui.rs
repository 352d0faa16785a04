//! Events for the UI.
//!
//! The UI runs on its own and only ever receives; nothing it does can
//! block the client.

use communique_store::RosterItem;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Offline,
    Online,
    Away,
    Busy,
    UpdateRoster(RosterItem),
    /// A background task failed.
    Error(String),
}

/// Sending half of the UI event channel.
#[derive(Debug, Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl UiHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Fire and forget; a closed UI is not an error.
    pub fn send(&self, event: UiEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("UI is gone, dropping {:?}", e.0);
        }
    }
}
