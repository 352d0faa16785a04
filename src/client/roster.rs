//! Roster refresh after (re)connecting.

use std::sync::Arc;
use std::time::Duration;

use communique_store::{RosterItem, Store};
use futures_util::StreamExt;
use tracing::{debug, info};

use super::error::ClientError;
use super::traits::Session;
use crate::ui::{UiEvent, UiHandle};

/// Give nameless entries something to show: the local part of the
/// address, or the domain for server-only addresses.
pub fn fill_display_name(item: &mut RosterItem) {
    if item.name.is_empty() {
        item.name = item.jid.localpart().to_string();
    }
    if item.name.is_empty() {
        item.name = item.jid.domainpart().to_string();
    }
}

/// Fetch the roster (incrementally when we hold a version), show each
/// entry as it arrives and store the result once the fetch completes.
pub(crate) async fn refresh(
    session: Arc<dyn Session>,
    store: Arc<Store>,
    ui: UiHandle,
    timeout: Duration,
) -> Result<usize, ClientError> {
    let ver = {
        let store = store.clone();
        tokio::task::spawn_blocking(move || store.roster_version()).await??
    };

    let items = tokio::time::timeout(timeout, async {
        let fetch = session.fetch_roster(&ver).await.map_err(ClientError::Roster)?;
        let mut stream = fetch.items;
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            let mut item = item.map_err(ClientError::Roster)?;
            fill_display_name(&mut item);
            ui.send(UiEvent::UpdateRoster(item.clone()));
            items.push(item);
        }
        Ok::<_, ClientError>((fetch.ver, items))
    })
    .await
    .map_err(|_| ClientError::Timeout("fetching roster"))??;

    let (new_ver, items) = items;
    let count = items.len();
    if new_ver.is_none() && count == 0 {
        debug!("Roster unchanged since version {ver:?}");
    }
    tokio::task::spawn_blocking(move || store.replace_roster(new_ver.as_deref(), items)).await??;
    info!("Roster refreshed with {count} item(s)");
    Ok(count)
}
