//! Lazy, single-pass iteration over query results.
//!
//! A `RowIter` runs its query on a pooled read connection in a worker
//! thread and hands decoded rows over a bounded channel, so rows are only
//! read from disk a little ahead of the consumer. Errors (opening the
//! connection, running the query, decoding a row) are deferred: they end
//! iteration and are reported by [`RowIter::err`] / [`RowIter::close`].

use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

use crate::db::ReaderPool;
use crate::error::{Result, StoreError};

/// How many decoded rows the worker may buffer ahead of the consumer.
const ROW_BUFFER: usize = 64;

pub struct RowIter<T> {
    rx: Option<Receiver<Result<T>>>,
    current: T,
    err: Option<StoreError>,
}

impl<T> RowIter<T>
where
    T: Default + Send + 'static,
{
    /// Start `sql` with `params` on a connection from `pool`.
    ///
    /// Construction never fails; a failure to start the query is reported
    /// by the first call to [`advance`](Self::advance).
    pub(crate) fn query<F>(pool: Arc<ReaderPool>, sql: &'static str, params: Vec<Value>, decode: F) -> Self
    where
        F: Fn(&Row<'_>) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = sync_channel(ROW_BUFFER);

        let worker = std::thread::Builder::new()
            .name("store-query".to_string())
            .spawn(move || {
                let run = |conn: &Connection| -> Result<()> {
                    let mut stmt = conn.prepare_cached(sql)?;
                    let mut rows = stmt.query(params_from_iter(params))?;
                    while let Some(row) = rows.next()? {
                        let value = decode(row)?;
                        if tx.send(Ok(value)).is_err() {
                            // Consumer went away.
                            return Ok(());
                        }
                    }
                    Ok(())
                };
                let result = pool.checkout().and_then(|conn| {
                    let result = run(&conn);
                    pool.checkin(conn);
                    result
                });
                if let Err(e) = result {
                    let _ = tx.send(Err(e));
                }
            });

        match worker {
            Ok(_) => Self {
                rx: Some(rx),
                current: T::default(),
                err: None,
            },
            Err(e) => Self::failed(StoreError::Worker(e.to_string())),
        }
    }

    /// An iterator that yields nothing and reports `err`.
    pub fn failed(err: StoreError) -> Self {
        Self {
            rx: None,
            current: T::default(),
            err: Some(err),
        }
    }

    /// Move to the next row. Returns false once the rows are exhausted or
    /// an error occurred.
    pub fn advance(&mut self) -> bool {
        let Some(rx) = &self.rx else {
            self.current = T::default();
            return false;
        };

        match rx.recv() {
            Ok(Ok(value)) => {
                self.current = value;
                true
            }
            Ok(Err(e)) => {
                self.err = Some(e);
                self.finish();
                false
            }
            // Worker finished without error.
            Err(_) => {
                self.finish();
                false
            }
        }
    }

    /// The row decoded by the last successful [`advance`](Self::advance),
    /// or the default value before the first row and after the last.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// The error that ended iteration, if any.
    pub fn err(&self) -> Option<&StoreError> {
        self.err.as_ref()
    }

    /// Stop iterating and return the deferred error, if any.
    pub fn close(mut self) -> Result<()> {
        self.rx = None;
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drain the remaining rows into a vector, stopping at the first error.
    pub fn collect_all(mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while self.advance() {
            out.push(std::mem::take(&mut self.current));
        }
        self.close().map(|()| out)
    }

    fn finish(&mut self) {
        self.rx = None;
        self.current = T::default();
    }
}
