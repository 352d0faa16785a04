//! Message history: deduplicating inserts, receipts and history queries.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use crate::db::Store;
use crate::error::Result;
use crate::iter::RowIter;
use crate::schema::{AFTER_ID, INSERT_MESSAGE, MARK_RECEIVED, QUERY_HISTORY};
use crate::types::{ArchiveCursor, ChatMessage, HistoryMessage, Jid, MessageType};

/// Result of [`Store::insert_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written, or an existing row gained its archive id.
    Stored(i64),
    /// The message (or its archive id) was already known.
    Duplicate,
}

impl Store {
    /// Flag the most recent sent message whose id or origin id is `key` as
    /// received by the other side. Unknown keys are ignored.
    pub fn mark_received(&self, key: &str) -> Result<()> {
        let changed = self.write(|conn| Ok(conn.prepare_cached(MARK_RECEIVED)?.execute(params![key])?))?;
        if changed == 0 {
            debug!("Receipt for unknown message {key}");
        }
        Ok(())
    }

    /// Store a message, deduplicating against earlier copies.
    ///
    /// `trust_delay` says whether the message came from a source allowed to
    /// assert its delivery time; otherwise the current time is used.
    /// `account` is the local address: it fills a missing sender and picks
    /// which stanza id counts as our archive id.
    pub fn insert_message(&self, msg: &ChatMessage, trust_delay: bool, account: &Jid) -> Result<InsertOutcome> {
        let delay = effective_delay(msg.delay, trust_delay, Utc::now());
        let from = if msg.from.is_empty() {
            account.clone()
        } else {
            msg.from.clone()
        };
        let roster_jid = if msg.sent {
            msg.to.bare()
        } else {
            from.bare()
        };
        let archive_id = msg.archive_id(account);

        let mut outcome = InsertOutcome::Duplicate;
        self.write_tx(|tx| {
            let id = tx
                .prepare_cached(INSERT_MESSAGE)?
                .query_row(
                    params![
                        msg.sent,
                        msg.to.to_string(),
                        from.to_string(),
                        from.bare().to_string(),
                        msg.id,
                        msg.dedup_id(),
                        msg.body,
                        msg.msg_type.as_str(),
                        delay.timestamp(),
                        roster_jid.to_string(),
                        archive_id,
                    ],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            match id {
                Some(id) => outcome = InsertOutcome::Stored(id),
                None => debug!("Message {} from {from} already stored", msg.id),
            }
            Ok(())
        })?;
        Ok(outcome)
    }

    /// Messages exchanged with `jid`, oldest first, optionally restricted to
    /// one message type. Errors surface through the iterator.
    pub fn query_history(&self, jid: &Jid, msg_type: Option<MessageType>) -> RowIter<HistoryMessage> {
        let params = vec![
            Value::Text(jid.bare().to_string()),
            Value::Text(msg_type.map(|t| t.as_str()).unwrap_or_default().to_string()),
        ];
        RowIter::query(self.streams(), QUERY_HISTORY, params, decode_history)
    }

    /// For each roster entry, the newest archive id we hold and its time.
    /// This is where archive backfill should resume.
    pub fn after_id(&self) -> RowIter<ArchiveCursor> {
        RowIter::query(self.streams(), AFTER_ID, Vec::new(), |row| {
            let jid: String = row.get(0)?;
            let archive_id: Option<String> = row.get(1)?;
            let delay: i64 = row.get(2)?;
            Ok(ArchiveCursor {
                jid: jid.parse()?,
                archive_id: archive_id.unwrap_or_default(),
                delay: from_unix(delay),
            })
        })
    }
}

/// The timestamp to store: the asserted delay if trusted and present,
/// otherwise `now`.
fn effective_delay(delay: Option<DateTime<Utc>>, trust_delay: bool, now: DateTime<Utc>) -> DateTime<Utc> {
    match delay {
        Some(d) if trust_delay && d.timestamp() != 0 => d,
        _ => now,
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn decode_history(row: &Row<'_>) -> Result<HistoryMessage> {
    let to: String = row.get(1)?;
    let from: String = row.get(2)?;
    let msg_type: String = row.get(6)?;
    Ok(HistoryMessage {
        sent: row.get(0)?,
        to: to.parse()?,
        from: from.parse()?,
        id: row.get(3)?,
        origin_id: row.get(4)?,
        body: row.get(5)?,
        msg_type: msg_type.parse()?,
        delay: from_unix(row.get(7)?),
        archive_id: row.get(8)?,
        received: row.get(9)?,
    })
}
