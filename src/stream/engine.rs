//! Row stream engine
//!
//! A finite, non-restartable pull sequence over server-side cursors. At
//! most one cursor is open at a time; when the current one is exhausted
//! the stream rolls over to the next pending query of the sequence (the
//! next item of a batch query). Whatever happens — exhaustion, error,
//! cancellation, drop — an opened cursor is closed exactly once.

use crate::driver::{DriverBinding, RowCursor};
use crate::error::{Error, Result};
use crate::stream::CancellationToken;
use crate::types::{ParamGroup, Row};
use std::collections::VecDeque;

/// Lazily-pulled sequence of rows borrowed from one session's driver.
///
/// The stream mutably borrows the driver, so the session cannot issue
/// further statements while a stream is live. Cancellation is the one
/// cross-thread entry point: clone the [`CancellationToken`] and raise it
/// from anywhere; the stream honors it at the next row boundary.
pub struct RowStream<'d> {
    driver: &'d mut dyn DriverBinding,
    cursor: Option<Box<dyn RowCursor>>,
    pending: VecDeque<(String, ParamGroup)>,
    cancel: CancellationToken,
    closed: bool,
    rows_yielded: u64,
    optimistic_lock: bool,
}

impl std::fmt::Debug for RowStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("pending", &self.pending.len())
            .field("closed", &self.closed)
            .field("rows_yielded", &self.rows_yielded)
            .field("optimistic_lock", &self.optimistic_lock)
            .finish_non_exhaustive()
    }
}

impl<'d> RowStream<'d> {
    /// Open the stream over an ordered sequence of queries, executing the
    /// first one eagerly.
    pub(crate) fn open(
        driver: &'d mut dyn DriverBinding,
        queries: Vec<(String, ParamGroup)>,
        optimistic_lock: bool,
    ) -> Result<Self> {
        let mut pending: VecDeque<_> = queries.into();
        let (sql, params) = pending
            .pop_front()
            .ok_or_else(|| Error::InvalidDescriptor("query sequence is empty".to_string()))?;
        let cursor = driver.execute_query(&sql, &params)?;
        Ok(Self {
            driver,
            cursor: Some(cursor),
            pending,
            cancel: CancellationToken::new(),
            closed: false,
            rows_yielded: 0,
            optimistic_lock,
        })
    }

    /// A token that cancels this stream; safe to raise from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn rows_yielded(&self) -> u64 {
        self.rows_yielded
    }

    /// Pull up to `count` rows, feeding each to `action`. Returns whether
    /// any row was produced. Exhausting the whole sequence closes the
    /// stream; zero total rows under an optimistic-lock expectation fails
    /// instead of quietly returning nothing.
    pub fn try_advance<F>(&mut self, count: usize, mut action: F) -> Result<bool>
    where
        F: FnMut(Row),
    {
        let mut produced = false;
        for _ in 0..count {
            match self.next_row()? {
                Some(row) => {
                    action(row);
                    produced = true;
                }
                None => break,
            }
        }
        Ok(produced)
    }

    /// Eagerly pull up to `count` rows into a detached prefix block for
    /// independent consumption. Returns `None` once the stream is closed,
    /// cancelled, or exhausted. Never opens a second connection-level
    /// resource and never reorders rows.
    pub fn try_split(&mut self, count: usize) -> Result<Option<RowBlock>> {
        if self.closed {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            self.close()?;
            return Ok(None);
        }
        let mut rows = Vec::new();
        while rows.len() < count {
            match self.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(RowBlock::new(rows)))
        }
    }

    /// Pull the next row, rolling over to the next pending query when the
    /// current cursor is exhausted.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            self.close()?;
            return Ok(None);
        }
        loop {
            if self.cursor.is_none() {
                match self.pending.pop_front() {
                    Some((sql, params)) => {
                        let cursor = match self.driver.execute_query(&sql, &params) {
                            Ok(cursor) => cursor,
                            Err(e) => return Err(self.fail(e)),
                        };
                        self.cursor = Some(cursor);
                    }
                    None => {
                        // natural exhaustion
                        self.close()?;
                        if self.optimistic_lock && self.rows_yielded == 0 {
                            return Err(Error::OptimisticLockFailed { index: 0 });
                        }
                        return Ok(None);
                    }
                }
            }
            let Some(cursor) = self.cursor.as_mut() else {
                continue;
            };
            match cursor.advance() {
                Ok(Some(row)) => {
                    self.rows_yielded += 1;
                    return Ok(Some(row));
                }
                Ok(None) => {
                    // current cursor drained; close it before rolling over
                    if let Some(mut done) = self.cursor.take() {
                        if let Err(e) = done.close() {
                            return Err(self.fail(e));
                        }
                    }
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Close the stream and its cursor. Idempotent; the single close of an
    /// opened cursor happens here, whichever path got us here first.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close()?;
        }
        Ok(())
    }

    /// Close on the error path, attaching a cleanup failure to the primary
    /// error as a suppressed cause.
    fn fail(&mut self, primary: Error) -> Error {
        match self.close() {
            Ok(()) => primary,
            Err(cleanup) => {
                tracing::error!(
                    error = %cleanup,
                    "cursor cleanup failed while propagating an execution error"
                );
                primary.with_suppressed(cleanup)
            }
        }
    }
}

impl Iterator for RowStream<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Drop for RowStream<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "failed to close row cursor on drop");
        }
    }
}

/// A detached, order-preserving prefix of a row stream produced by
/// [`RowStream::try_split`]. Owns its rows; consuming it touches no
/// connection-level resource.
#[derive(Debug)]
pub struct RowBlock {
    rows: VecDeque<Row>,
}

impl RowBlock {
    fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Iterator for RowBlock {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.pop_front()
    }
}
