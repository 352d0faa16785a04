//! Writes inbound stream events through to the store and the UI.

use std::sync::Arc;

use async_trait::async_trait;
use communique_store::{Jid, Store};
use tracing::{debug, warn};

use super::traits::{InboundEvent, InboundHandler};
use crate::ui::{UiEvent, UiHandle};

pub struct StoreHandler {
    store: Arc<Store>,
    account: Jid,
    ui: UiHandle,
}

impl StoreHandler {
    pub fn new(store: Arc<Store>, account: Jid, ui: UiHandle) -> Self {
        Self { store, account, ui }
    }

    async fn apply(&self, event: InboundEvent) -> anyhow::Result<()> {
        let store = self.store.clone();
        let account = self.account.clone();
        match event {
            InboundEvent::Message(msg) => {
                tokio::task::spawn_blocking(move || store.insert_message(&msg, false, &account))
                    .await??;
            }
            InboundEvent::Archived { archive, msg } => {
                // Only our own server may tell us when a message was sent.
                let trusted = archive.is_empty() || archive.bare() == account.bare();
                if !trusted {
                    debug!("Not trusting delay from archive {archive}");
                }
                tokio::task::spawn_blocking(move || store.insert_message(&msg, trusted, &account))
                    .await??;
            }
            InboundEvent::Receipt(id) => {
                tokio::task::spawn_blocking(move || store.mark_received(&id)).await??;
            }
            InboundEvent::RosterPush { ver, item } => {
                let pushed = item.clone();
                tokio::task::spawn_blocking(move || store.update_roster(ver.as_deref(), &pushed))
                    .await??;
                self.ui.send(UiEvent::UpdateRoster(item));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InboundHandler for StoreHandler {
    async fn handle(&self, event: InboundEvent) {
        if let Err(e) = self.apply(event).await {
            warn!("Error storing inbound event: {e:#}");
        }
    }
}
