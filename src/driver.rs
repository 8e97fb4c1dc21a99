//! Driver binding boundary
//!
//! The runtime mediates over an already-connected driver supplied by the
//! caller. Everything below this trait (wire protocol, pooling, value
//! codec) is out of scope; everything above it treats the driver as an
//! opaque capability.

use crate::error::Result;
use crate::transaction::{TransactionOptions, XaFlags, Xid};
use crate::types::{ParamGroup, Row, Value};
use std::time::Duration;

/// What the driver can do, negotiated once at connection setup and
/// threaded into the coordinator. Never queried per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverCapabilities {
    /// The driver supports a single batched round trip for multi-group
    /// statements; without it the coordinator falls back to sequential
    /// execution.
    pub batch_updates: bool,
    /// The driver can report server-generated identity values for the
    /// statement just executed.
    pub generated_keys: bool,
    pub savepoints: bool,
    /// The driver honors a per-statement timeout hint. The coordinator
    /// enforces deadlines locally either way.
    pub statement_timeout: bool,
}

impl Default for DriverCapabilities {
    fn default() -> Self {
        Self {
            batch_updates: true,
            generated_keys: true,
            savepoints: true,
            statement_timeout: true,
        }
    }
}

/// An open server-side result resource.
///
/// Cursors are scarce: whoever opens one must close it exactly once.
pub trait RowCursor {
    /// Pull the next row, or `None` when the result set is exhausted.
    fn advance(&mut self) -> Result<Option<Row>>;

    /// Release the server-side resource. Must be idempotent.
    fn close(&mut self) -> Result<()>;
}

impl std::fmt::Debug for dyn RowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RowCursor")
    }
}

/// Blocking driver binding for one connection.
///
/// All calls are blocking and the connection is single-owner; the session
/// serializes access. Update counts use `u64` regardless of the driver's
/// native width.
pub trait DriverBinding {
    fn capabilities(&self) -> DriverCapabilities;

    fn execute_update(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    fn execute_query(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor>>;

    /// Execute `sql` once per parameter group in a single round trip,
    /// returning one affected-row count per group in submission order.
    fn execute_batch(&mut self, sql: &str, param_groups: &[ParamGroup]) -> Result<Vec<u64>>;

    /// Server-generated identity values for the statement just executed,
    /// in row order.
    fn generated_keys(&mut self) -> Result<Vec<Value>>;

    fn set_statement_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;

    // Local transaction verbs
    fn begin(&mut self, options: &TransactionOptions) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn savepoint(&mut self, name: &str) -> Result<()>;
    fn release_savepoint(&mut self, name: &str) -> Result<()>;
    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;

    // XA protocol verbs
    fn xa_start(&mut self, xid: &Xid, flags: XaFlags) -> Result<()>;
    fn xa_end(&mut self, xid: &Xid, flags: XaFlags) -> Result<()>;
    fn xa_prepare(&mut self, xid: &Xid) -> Result<()>;
    fn xa_commit(&mut self, xid: &Xid, one_phase: bool) -> Result<()>;
    fn xa_rollback(&mut self, xid: &Xid) -> Result<()>;
    fn xa_forget(&mut self, xid: &Xid) -> Result<()>;
    fn xa_recover(&mut self) -> Result<Vec<Xid>>;
}
