//! communique: an XMPP client core with a local-first message store.
//!
//! The [`client`] module drives the connection and presence lifecycle and
//! writes inbound traffic into a [`communique_store::Store`]; the UI only
//! ever sees [`ui::UiEvent`]s.

pub mod client;
pub mod config;
pub mod ui;

pub use client::{Client, ClientError, ConnState};
pub use config::Config;
pub use ui::{UiEvent, UiHandle};

use anyhow::{Context, Result};
use communique_store::{Store, StoreOptions};

/// Open the account's store, honoring an explicit `db_path`.
pub fn open_store(config: &Config) -> Result<Store> {
    let account = config.account()?.bare();
    let mut opts = StoreOptions::new(config::APP_NAME, account.to_string());
    if let Some(path) = &config.db_path {
        opts = opts.with_db_file(path);
    }
    Store::open(&opts).with_context(|| format!("Failed to open the message store for {account}"))
}

/// The password source a config asks for.
pub fn secret_source(config: &Config) -> Result<std::sync::Arc<dyn client::SecretSource>> {
    if !config.password_eval.is_empty() {
        return Ok(std::sync::Arc::new(client::CommandSecret::new(&config.password_eval)));
    }
    match &config.password {
        Some(password) => Ok(std::sync::Arc::new(client::StaticSecret::new(password))),
        None => anyhow::bail!("No password configured; set password_eval"),
    }
}
