//! Call-counting mock driver
//!
//! A scriptable in-memory [`DriverBinding`] used by this crate's tests and
//! available to downstream tests. Results are queued ahead of time; every
//! verb is counted; cursors count their closes so resource discipline is
//! verifiable.

use crate::driver::{DriverBinding, DriverCapabilities, RowCursor};
use crate::error::{Error, Result};
use crate::transaction::{TransactionOptions, XaFlags, Xid};
use crate::types::{ParamGroup, Row, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Per-verb call counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub execute_update: usize,
    pub execute_query: usize,
    pub execute_batch: usize,
    pub generated_keys: usize,
    pub set_statement_timeout: usize,
    pub begin: usize,
    pub commit: usize,
    pub rollback: usize,
    pub savepoint: usize,
    pub release_savepoint: usize,
    pub rollback_to_savepoint: usize,
    pub xa_start: usize,
    pub xa_end: usize,
    pub xa_prepare: usize,
    pub xa_commit: usize,
    pub xa_rollback: usize,
    pub xa_forget: usize,
    pub xa_recover: usize,
}

impl CallCounts {
    /// Total number of driver round trips of any kind.
    pub fn total(&self) -> usize {
        self.execute_update
            + self.execute_query
            + self.execute_batch
            + self.generated_keys
            + self.set_statement_timeout
            + self.begin
            + self.commit
            + self.rollback
            + self.savepoint
            + self.release_savepoint
            + self.rollback_to_savepoint
            + self.xa_start
            + self.xa_end
            + self.xa_prepare
            + self.xa_commit
            + self.xa_rollback
            + self.xa_forget
            + self.xa_recover
    }
}

/// A statement the mock saw, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub param_groups: Vec<ParamGroup>,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Update,
    Query,
    Batch,
}

/// Scripted result set for one `execute_query` call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCursor {
    rows: VecDeque<Row>,
    /// Error returned by `advance` once the scripted rows run out.
    advance_error: Option<Error>,
    /// Error returned by the first `close` call.
    close_error: Option<Error>,
}

impl ScriptedCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into(),
            advance_error: None,
            close_error: None,
        }
    }

    pub fn failing_advance(mut self, error: Error) -> Self {
        self.advance_error = Some(error);
        self
    }

    pub fn failing_close(mut self, error: Error) -> Self {
        self.close_error = Some(error);
        self
    }
}

#[derive(Default)]
struct MockInner {
    counts: CallCounts,
    executed: Vec<ExecutedStatement>,
    update_results: VecDeque<Result<u64>>,
    batch_results: VecDeque<Result<Vec<u64>>>,
    query_results: VecDeque<ScriptedCursor>,
    generated_key_results: VecDeque<Vec<Value>>,
    commit_results: VecDeque<Result<()>>,
    rollback_results: VecDeque<Result<()>>,
    recovered: Vec<Xid>,
    open_cursors: usize,
    cursor_closes: usize,
    last_timeout: Option<Duration>,
}

/// Scriptable, call-counting driver double. Cloning yields a handle to the
/// same underlying state, so a test can keep observing a driver it handed
/// to a session.
#[derive(Clone)]
pub struct MockDriver {
    inner: Arc<Mutex<MockInner>>,
    capabilities: DriverCapabilities,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::with_capabilities(DriverCapabilities::default())
    }

    pub fn with_capabilities(capabilities: DriverCapabilities) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockInner::default())),
            capabilities,
        }
    }

    /// Queue the result of the next `execute_update` call. Unscripted
    /// calls report one affected row.
    pub fn push_update_result(&self, result: Result<u64>) {
        self.inner.lock().update_results.push_back(result);
    }

    /// Queue the result of the next `execute_batch` call. Unscripted calls
    /// report one affected row per group.
    pub fn push_batch_result(&self, result: Result<Vec<u64>>) {
        self.inner.lock().batch_results.push_back(result);
    }

    /// Queue the result set of the next `execute_query` call. Unscripted
    /// calls produce an empty cursor.
    pub fn push_query_rows(&self, rows: Vec<Row>) {
        self.push_query_cursor(ScriptedCursor::new(rows));
    }

    pub fn push_query_cursor(&self, cursor: ScriptedCursor) {
        self.inner.lock().query_results.push_back(cursor);
    }

    /// Queue the keys reported by the next `generated_keys` call.
    pub fn push_generated_keys(&self, keys: Vec<Value>) {
        self.inner.lock().generated_key_results.push_back(keys);
    }

    pub fn push_commit_result(&self, result: Result<()>) {
        self.inner.lock().commit_results.push_back(result);
    }

    pub fn push_rollback_result(&self, result: Result<()>) {
        self.inner.lock().rollback_results.push_back(result);
    }

    pub fn set_recovered(&self, xids: Vec<Xid>) {
        self.inner.lock().recovered = xids;
    }

    pub fn counts(&self) -> CallCounts {
        self.inner.lock().counts.clone()
    }

    pub fn executed(&self) -> Vec<ExecutedStatement> {
        self.inner.lock().executed.clone()
    }

    /// Cursors currently open (opened minus closed).
    pub fn open_cursors(&self) -> usize {
        self.inner.lock().open_cursors
    }

    /// Total number of effective cursor closes observed.
    pub fn cursor_closes(&self) -> usize {
        self.inner.lock().cursor_closes
    }

    /// The timeout hint most recently passed to `set_statement_timeout`.
    pub fn last_timeout(&self) -> Option<Duration> {
        self.inner.lock().last_timeout
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverBinding for MockDriver {
    fn capabilities(&self) -> DriverCapabilities {
        self.capabilities
    }

    fn execute_update(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut inner = self.inner.lock();
        inner.counts.execute_update += 1;
        inner.executed.push(ExecutedStatement {
            sql: sql.to_string(),
            param_groups: vec![params.to_vec()],
            kind: StatementKind::Update,
        });
        inner.update_results.pop_front().unwrap_or(Ok(1))
    }

    fn execute_query(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor>> {
        let mut inner = self.inner.lock();
        inner.counts.execute_query += 1;
        if inner.open_cursors > 0 {
            return Err(Error::CursorAlreadyOpen);
        }
        inner.executed.push(ExecutedStatement {
            sql: sql.to_string(),
            param_groups: vec![params.to_vec()],
            kind: StatementKind::Query,
        });
        let script = inner.query_results.pop_front().unwrap_or_default();
        inner.open_cursors += 1;
        Ok(Box::new(MockCursor {
            script,
            shared: self.inner.clone(),
            closed: false,
        }))
    }

    fn execute_batch(&mut self, sql: &str, param_groups: &[ParamGroup]) -> Result<Vec<u64>> {
        let mut inner = self.inner.lock();
        inner.counts.execute_batch += 1;
        inner.executed.push(ExecutedStatement {
            sql: sql.to_string(),
            param_groups: param_groups.to_vec(),
            kind: StatementKind::Batch,
        });
        inner
            .batch_results
            .pop_front()
            .unwrap_or_else(|| Ok(vec![1; param_groups.len()]))
    }

    fn generated_keys(&mut self) -> Result<Vec<Value>> {
        let mut inner = self.inner.lock();
        inner.counts.generated_keys += 1;
        Ok(inner.generated_key_results.pop_front().unwrap_or_default())
    }

    fn set_statement_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.counts.set_statement_timeout += 1;
        inner.last_timeout = timeout;
        Ok(())
    }

    fn begin(&mut self, _options: &TransactionOptions) -> Result<()> {
        self.inner.lock().counts.begin += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.counts.commit += 1;
        inner.commit_results.pop_front().unwrap_or(Ok(()))
    }

    fn rollback(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.counts.rollback += 1;
        inner.rollback_results.pop_front().unwrap_or(Ok(()))
    }

    fn savepoint(&mut self, _name: &str) -> Result<()> {
        self.inner.lock().counts.savepoint += 1;
        Ok(())
    }

    fn release_savepoint(&mut self, _name: &str) -> Result<()> {
        self.inner.lock().counts.release_savepoint += 1;
        Ok(())
    }

    fn rollback_to_savepoint(&mut self, _name: &str) -> Result<()> {
        self.inner.lock().counts.rollback_to_savepoint += 1;
        Ok(())
    }

    fn xa_start(&mut self, _xid: &Xid, _flags: XaFlags) -> Result<()> {
        self.inner.lock().counts.xa_start += 1;
        Ok(())
    }

    fn xa_end(&mut self, _xid: &Xid, _flags: XaFlags) -> Result<()> {
        self.inner.lock().counts.xa_end += 1;
        Ok(())
    }

    fn xa_prepare(&mut self, _xid: &Xid) -> Result<()> {
        self.inner.lock().counts.xa_prepare += 1;
        Ok(())
    }

    fn xa_commit(&mut self, _xid: &Xid, _one_phase: bool) -> Result<()> {
        self.inner.lock().counts.xa_commit += 1;
        Ok(())
    }

    fn xa_rollback(&mut self, _xid: &Xid) -> Result<()> {
        self.inner.lock().counts.xa_rollback += 1;
        Ok(())
    }

    fn xa_forget(&mut self, _xid: &Xid) -> Result<()> {
        self.inner.lock().counts.xa_forget += 1;
        Ok(())
    }

    fn xa_recover(&mut self) -> Result<Vec<Xid>> {
        let mut inner = self.inner.lock();
        inner.counts.xa_recover += 1;
        Ok(inner.recovered.clone())
    }
}

struct MockCursor {
    script: ScriptedCursor,
    shared: Arc<Mutex<MockInner>>,
    closed: bool,
}

impl RowCursor for MockCursor {
    fn advance(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        match self.script.rows.pop_front() {
            Some(row) => Ok(Some(row)),
            None => match self.script.advance_error.take() {
                Some(error) => Err(error),
                None => Ok(None),
            },
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        {
            let mut inner = self.shared.lock();
            inner.open_cursors -= 1;
            inner.cursor_closes += 1;
        }
        match self.script.close_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for MockCursor {
    fn drop(&mut self) {
        // an abandoned cursor still releases its slot
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_cursor_may_be_open() {
        let mut driver = MockDriver::new();
        let cursor = driver.execute_query("SELECT 1", &[]).unwrap();

        let err = driver.execute_query("SELECT 2", &[]).unwrap_err();
        assert_eq!(err, Error::CursorAlreadyOpen);

        drop(cursor);
        assert_eq!(driver.open_cursors(), 0);
        driver.execute_query("SELECT 2", &[]).unwrap();
    }

    #[test]
    fn cursor_close_is_idempotent_and_counted_once() {
        let mut driver = MockDriver::new();
        let mut cursor = driver.execute_query("SELECT 1", &[]).unwrap();
        cursor.close().unwrap();
        cursor.close().unwrap();
        drop(cursor);
        assert_eq!(driver.cursor_closes(), 1);
    }
}
