//! Opening the database and running transactions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Transaction};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::paths::{candidate_paths, resolve_db_path};
use crate::schema::{READ_STATEMENTS, SCHEMA, STREAM_STATEMENTS, WRITE_STATEMENTS};

/// Upper bound on cached prepared statements per connection.
const STATEMENT_CACHE_CAPACITY: usize = 32;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Idle streaming connections kept for reuse.
const MAX_IDLE_STREAMS: usize = 4;

/// Where and for whom to open a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Directory name used under the platform data dir.
    pub app_name: String,
    /// Account address; the file is named `<account>.db`.
    pub account: String,
    /// Explicit database file, bypassing the search order.
    pub db_file: Option<PathBuf>,
}

impl StoreOptions {
    pub fn new(app_name: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            account: account.into(),
            db_file: None,
        }
    }

    pub fn with_db_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_file = Some(path.into());
        self
    }
}

/// The local message and roster database.
///
/// All writes go through one connection behind a mutex, so at most one
/// write transaction is in flight at a time. Plain reads use a separate
/// reader connection and never wait on the write mutex; streaming queries
/// borrow a read connection from a small pool for as long as they run.
pub struct Store {
    path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    streams: Arc<ReaderPool>,
}

impl Store {
    /// Resolve the database location, then open it.
    pub fn open(opts: &StoreOptions) -> Result<Self> {
        let candidates = candidate_paths(&opts.app_name, &opts.account, opts.db_file.as_deref());
        let path = resolve_db_path(&candidates)?;
        Self::open_path(&path)
    }

    /// Open or create the database at exactly `path`.
    pub fn open_path(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;
        writer.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        writer.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        writer.execute_batch(SCHEMA)?;
        prepare_all(&writer, WRITE_STATEMENTS)?;

        let reader = open_reader(path)?;
        prepare_all(&reader, READ_STATEMENTS)?;

        let streams = Arc::new(ReaderPool::new(path));
        streams.warm()?;

        info!("Opened message store at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            streams,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` inside a write transaction.
    ///
    /// Returning `Ok` commits. Returning [`StoreError::Rollback`] rolls back
    /// and reports success; any other error rolls back and is returned.
    pub fn write_tx<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Transaction<'_>) -> Result<()>,
    {
        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;

        match f(&tx) {
            Ok(()) => tx.commit()?,
            Err(StoreError::Rollback) => {
                debug!("Transaction rolled back on request");
                tx.rollback()?;
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    warn!("Failed to roll back transaction after {e}: {rb}");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run a read against the shared reader connection.
    pub(crate) fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.reader.lock();
        f(&conn)
    }

    /// Read connections for streaming queries.
    pub(crate) fn streams(&self) -> Arc<ReaderPool> {
        self.streams.clone()
    }

    /// Run a single statement on the writer outside an explicit transaction.
    pub(crate) fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.writer.lock();
        f(&conn)
    }
}

/// Read-only connections for streaming queries, each with the streaming
/// statements already in its cache. A connection is checked out for the
/// life of one query and handed back when the query ends.
pub(crate) struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Open one connection up front so a broken statement fails the open.
    fn warm(&self) -> Result<()> {
        let conn = self.checkout()?;
        self.checkin(conn);
        Ok(())
    }

    pub(crate) fn checkout(&self) -> Result<Connection> {
        if let Some(conn) = self.idle.lock().pop() {
            return Ok(conn);
        }
        debug!("Opening streaming connection to {}", self.path.display());
        let conn = open_reader(&self.path)?;
        prepare_all(&conn, STREAM_STATEMENTS)?;
        Ok(conn)
    }

    pub(crate) fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_STREAMS {
            idle.push(conn);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Open a read-only connection with the same settings as the writer.
fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
    )?;
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

/// Prepare every statement once so a broken statement fails the open
/// rather than the first call that needs it.
fn prepare_all(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    for sql in statements {
        conn.prepare_cached(sql)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RosterItem, Subscription};
    use rusqlite::params;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open_path(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn version(store: &Store) -> Option<String> {
        store
            .read(|conn| {
                let mut stmt = conn.prepare("SELECT ver FROM roster_version WHERE id = 0")?;
                let mut rows = stmt.query([])?;
                Ok(match rows.next()? {
                    Some(row) => Some(row.get(0)?),
                    None => None,
                })
            })
            .unwrap()
    }

    #[test]
    fn open_applies_schema_idempotently() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        drop(Store::open_path(&path).unwrap());
        let store = Store::open_path(&path).unwrap();
        assert_eq!(store.path(), path);
    }

    #[test]
    fn open_resolves_explicit_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("accounts/me.db");
        let opts = StoreOptions::new("communique", "me@example.com").with_db_file(&file);
        let store = Store::open(&opts).unwrap();
        assert_eq!(store.path(), file);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let (store, _dir) = test_store();
        let err = store
            .write_tx(|tx| {
                tx.execute(
                    "INSERT INTO roster_groups (jid, name) VALUES (?1, ?2)",
                    params!["ghost@example.com", "Friends"],
                )?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn write_tx_commits_on_ok() {
        let (store, _dir) = test_store();
        store
            .write_tx(|tx| {
                tx.execute("INSERT INTO roster_version (id, ver) VALUES (0, 'v1')", [])?;
                Ok(())
            })
            .unwrap();
        assert_eq!(version(&store).as_deref(), Some("v1"));
    }

    #[test]
    fn write_tx_rollback_is_not_an_error() {
        let (store, _dir) = test_store();
        store
            .write_tx(|tx| {
                tx.execute("INSERT INTO roster_version (id, ver) VALUES (0, 'v1')", [])?;
                Err(StoreError::Rollback)
            })
            .unwrap();
        assert_eq!(version(&store), None);
    }

    #[test]
    fn write_tx_other_errors_roll_back_and_propagate() {
        let (store, _dir) = test_store();
        let err = store
            .write_tx(|tx| {
                tx.execute("INSERT INTO roster_version (id, ver) VALUES (0, 'v1')", [])?;
                tx.execute("INSERT INTO no_such_table VALUES (1)", [])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert_eq!(version(&store), None);
    }

    #[test]
    fn reads_do_not_wait_for_write_mutex() {
        let (store, _dir) = test_store();
        let _writer = store.writer.lock();
        // The writer is held; the reader must still answer.
        assert_eq!(version(&store), None);
    }

    #[test]
    fn roster_listing_runs_on_reader_while_writer_is_held() {
        let (store, _dir) = test_store();
        let juliet = RosterItem::new("juliet@example.com".parse().unwrap(), "Juliet", Subscription::Both);
        store.replace_roster(Some("v3"), vec![juliet.clone()]).unwrap();

        let _writer = store.writer.lock();
        for _ in 0..2 {
            let mut seen = Vec::new();
            store
                .for_each_roster_item(|ver, item| seen.push((ver.to_string(), item)))
                .unwrap();
            assert_eq!(seen, vec![("v3".to_string(), juliet.clone())]);
        }
    }
}
