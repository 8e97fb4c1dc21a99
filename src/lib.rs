//! SQL statement execution and transaction coordination runtime.
//!
//! This crate sits between a SQL-generation layer and a database driver:
//! it takes immutable [`StatementDescriptor`]s, drives them to completion
//! over a [`DriverBinding`], reconciles affected-row counts against the
//! descriptor's declared expectations, and tracks local and distributed
//! (XA) transaction state for the session owning the connection.
//!
//! The entry point is [`Session`] (or the [`LocalSession`]/[`XaSession`]
//! aliases): one session per connection, driven by one thread. Query
//! results come back as a lazily-pulled [`RowStream`] whose
//! [`CancellationToken`] is the only session handle safe to touch from
//! another thread.

mod coordinator;
mod descriptor;
mod driver;
mod error;
pub mod mock;
mod reconcile;
mod session;
mod stream;
mod transaction;
mod types;

pub use coordinator::{
    ExecutionContext, ExecutionMetadata, ExecutionResult, StatementCoordinator,
};
pub use descriptor::{
    BatchStatement, GeneratedKeySpec, PairOrder, PairedBatchStatement, PairedStatement,
    RowSemantics, SimpleStatement, StatementDescriptor,
};
pub use driver::{DriverBinding, DriverCapabilities, RowCursor};
pub use error::{Error, ErrorCategory, Result};
pub use reconcile::{
    check_batch_len, check_optimistic_lock, check_pair, ReconciliationOutcome,
};
pub use session::{
    LocalBackend, LocalSession, Session, TransactionBackend, XaBackend, XaSession,
};
pub use stream::{CancellationToken, RowBlock, RowStream};
pub use transaction::{
    IsolationLevel, LocalState, LocalTransaction, TransactionInfo, TransactionMode,
    TransactionOptions, XaBranchState, XaFlags, XaInfo, XaTransaction, Xid,
};
pub use types::{ParamGroup, Row, Value};
