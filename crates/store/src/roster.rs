//! Roster persistence: full replace, incremental pushes and reads.

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

use crate::db::Store;
use crate::error::Result;
use crate::schema::{
    CLEAR_ROSTER_GROUPS, DELETE_ROSTER_ITEM, INSERT_ROSTER_GROUP, SELECT_ROSTER,
    SELECT_ROSTER_GROUPS, SELECT_ROSTER_ITEM, SELECT_ROSTER_VERSION, TRUNCATE_ROSTER,
    UPSERT_ROSTER_ITEM, UPSERT_ROSTER_VERSION,
};
use crate::types::{Jid, RosterItem, Subscription};

impl Store {
    /// Replace the whole roster with `items`, recording `ver` if given.
    ///
    /// The existing roster is only cleared once the first item arrives, so
    /// an empty sync (the server reporting "no change") leaves it untouched.
    pub fn replace_roster<I>(&self, ver: Option<&str>, items: I) -> Result<()>
    where
        I: IntoIterator<Item = RosterItem>,
    {
        self.write_tx(|tx| {
            if let Some(ver) = ver.filter(|v| !v.is_empty()) {
                upsert_version(tx, ver)?;
            }

            let mut truncated = false;
            for item in items {
                if item.subscription == Subscription::Remove {
                    debug!("Skipping removed roster item {} in full sync", item.jid);
                    continue;
                }
                if !truncated {
                    tx.prepare_cached(TRUNCATE_ROSTER)?.execute([])?;
                    truncated = true;
                }
                upsert_item(tx, &item)?;
            }
            Ok(())
        })
    }

    /// Apply a single roster push.
    ///
    /// A `remove` subscription deletes the entry (its groups follow via the
    /// foreign key); anything else inserts or updates it.
    pub fn update_roster(&self, ver: Option<&str>, item: &RosterItem) -> Result<()> {
        self.write_tx(|tx| {
            if let Some(ver) = ver.filter(|v| !v.is_empty()) {
                upsert_version(tx, ver)?;
            }
            if item.subscription == Subscription::Remove {
                tx.prepare_cached(DELETE_ROSTER_ITEM)?
                    .execute(params![item.jid.bare().to_string()])?;
                return Ok(());
            }
            upsert_item(tx, item)
        })
    }

    /// The stored roster version, or an empty string if none was ever saved.
    pub fn roster_version(&self) -> Result<String> {
        self.read(select_version)
    }

    /// Look up a single roster entry with its groups.
    pub fn roster_item(&self, jid: &Jid) -> Result<Option<RosterItem>> {
        self.read(|conn| {
            let item = conn
                .prepare_cached(SELECT_ROSTER_ITEM)?
                .query_row(params![jid.bare().to_string()], decode_item)
                .optional()?;
            match item {
                Some(item) => Ok(Some(with_groups(conn, item?)?)),
                None => Ok(None),
            }
        })
    }

    /// Call `f` with the version token and every roster entry.
    ///
    /// Version and entries are read in one transaction so they describe the
    /// same state. `f` must not call back into the store.
    pub fn for_each_roster_item<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, RosterItem),
    {
        self.read(|conn| {
            let tx = conn.unchecked_transaction()?;
            let ver = select_version(&tx)?;
            {
                let mut stmt = tx.prepare_cached(SELECT_ROSTER)?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let item = with_groups(&tx, decode_item(row)??)?;
                    f(&ver, item);
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}

/// Record the roster version inside an open transaction.
pub fn upsert_version(tx: &Transaction<'_>, ver: &str) -> Result<()> {
    tx.prepare_cached(UPSERT_ROSTER_VERSION)?.execute(params![ver])?;
    Ok(())
}

/// Insert or update an entry and replace its groups inside an open transaction.
pub fn upsert_item(tx: &Transaction<'_>, item: &RosterItem) -> Result<()> {
    let bare = item.jid.bare().to_string();
    tx.prepare_cached(UPSERT_ROSTER_ITEM)?
        .execute(params![bare, item.name, item.subscription.as_str()])?;

    tx.prepare_cached(CLEAR_ROSTER_GROUPS)?.execute(params![bare])?;
    let mut insert_group = tx.prepare_cached(INSERT_ROSTER_GROUP)?;
    for group in &item.groups {
        insert_group.execute(params![bare, group])?;
    }
    Ok(())
}

fn select_version(conn: &Connection) -> Result<String> {
    let ver = conn
        .prepare_cached(SELECT_ROSTER_VERSION)?
        .query_row([], |row| row.get::<_, String>(0))
        .optional()?;
    Ok(ver.unwrap_or_default())
}

/// Decode `jid, name, subs`. The outer result carries column errors, the
/// inner one parse errors of the stored values.
fn decode_item(row: &Row<'_>) -> rusqlite::Result<Result<RosterItem>> {
    let jid: String = row.get(0)?;
    let name: String = row.get(1)?;
    let subs: String = row.get(2)?;
    Ok(parse_item(&jid, name, &subs))
}

fn parse_item(jid: &str, name: String, subs: &str) -> Result<RosterItem> {
    Ok(RosterItem {
        jid: jid.parse()?,
        name,
        subscription: subs.parse()?,
        groups: Vec::new(),
    })
}

fn with_groups(conn: &Connection, mut item: RosterItem) -> Result<RosterItem> {
    let mut stmt = conn.prepare_cached(SELECT_ROSTER_GROUPS)?;
    let groups = stmt
        .query_map(params![item.jid.to_string()], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    item.groups = groups;
    Ok(item)
}
