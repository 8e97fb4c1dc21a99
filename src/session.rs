//! Session façade
//!
//! One session owns one driver connection and one transaction state
//! machine, and every call happens on the thread driving the session. The
//! only cross-thread entry point is the [`CancellationToken`] handed out
//! by a row stream.
//!
//! [`CancellationToken`]: crate::stream::CancellationToken

use crate::coordinator::{ExecutionContext, ExecutionResult, StatementCoordinator};
use crate::descriptor::StatementDescriptor;
use crate::driver::{DriverBinding, DriverCapabilities};
use crate::error::{Error, Result};
use crate::stream::RowStream;
use crate::transaction::{
    LocalTransaction, TransactionInfo, TransactionMode, TransactionOptions, XaFlags,
    XaTransaction, Xid,
};
use crate::types::Row;

/// Transaction state machine behind a session, local or distributed.
pub trait TransactionBackend {
    fn in_transaction(&self) -> bool;
    fn is_rollback_only(&self) -> bool;
    fn mark_rollback_only(&mut self) -> Result<()>;
    fn info(&self) -> Option<&TransactionInfo>;
    /// Best-effort rollback of whatever is live, used when the session
    /// closes with work outstanding.
    fn abandon(&mut self, driver: &mut dyn DriverBinding) -> Result<()>;
}

/// Local (connection-scoped) transaction backend.
#[derive(Default)]
pub struct LocalBackend {
    tx: LocalTransaction,
}

impl TransactionBackend for LocalBackend {
    fn in_transaction(&self) -> bool {
        self.tx.in_transaction()
    }

    fn is_rollback_only(&self) -> bool {
        self.tx.is_rollback_only()
    }

    fn mark_rollback_only(&mut self) -> Result<()> {
        self.tx.mark_rollback_only()
    }

    fn info(&self) -> Option<&TransactionInfo> {
        self.tx.info()
    }

    fn abandon(&mut self, driver: &mut dyn DriverBinding) -> Result<()> {
        use crate::transaction::LocalState;
        match self.tx.state() {
            LocalState::Active | LocalState::FailedCommit | LocalState::FailedRollback => {
                self.tx.rollback(driver)
            }
            _ => Ok(()),
        }
    }
}

/// Distributed (XA) transaction backend.
#[derive(Default)]
pub struct XaBackend {
    tx: XaTransaction,
}

impl TransactionBackend for XaBackend {
    fn in_transaction(&self) -> bool {
        self.tx.in_transaction()
    }

    fn is_rollback_only(&self) -> bool {
        self.tx.is_rollback_only()
    }

    fn mark_rollback_only(&mut self) -> Result<()> {
        self.tx.mark_rollback_only()
    }

    fn info(&self) -> Option<&TransactionInfo> {
        self.tx.info()
    }

    fn abandon(&mut self, driver: &mut dyn DriverBinding) -> Result<()> {
        use crate::transaction::XaBranchState;
        let Some(xid) = self.tx.xid().cloned() else {
            return Ok(());
        };
        match self.tx.state() {
            XaBranchState::Active => {
                self.tx.end(driver, &xid, XaFlags::FAIL)?;
                self.tx.rollback(driver, &xid)
            }
            XaBranchState::Idle | XaBranchState::Prepared => self.tx.rollback(driver, &xid),
            _ => Ok(()),
        }
    }
}

/// A single-connection execution session.
///
/// The session is single-threaded by construction: statement execution,
/// transaction verbs, and close all borrow it mutably, and a live
/// [`RowStream`] keeps it mutably borrowed until the stream is dropped.
pub struct Session<D, B> {
    driver: D,
    coordinator: StatementCoordinator,
    backend: B,
    closed: bool,
}

/// Session over a local transaction.
pub type LocalSession<D> = Session<D, LocalBackend>;

/// Session over a distributed (XA) transaction branch.
pub type XaSession<D> = Session<D, XaBackend>;

impl<D: DriverBinding, B: TransactionBackend + Default> Session<D, B> {
    fn open(driver: D) -> Self {
        // capabilities are negotiated once, at session setup
        let coordinator = StatementCoordinator::new(driver.capabilities());
        Self {
            driver,
            coordinator,
            backend: B::default(),
            closed: false,
        }
    }
}

impl<D: DriverBinding, B: TransactionBackend> Session<D, B> {
    pub fn capabilities(&self) -> &DriverCapabilities {
        self.coordinator.capabilities()
    }

    pub fn in_transaction(&self) -> bool {
        self.backend.in_transaction()
    }

    pub fn is_rollback_only(&self) -> bool {
        self.backend.is_rollback_only()
    }

    /// Latch the current transaction rollback-only.
    pub fn mark_rollback_only(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.backend.mark_rollback_only()
    }

    /// Snapshot of the current transaction, if any.
    pub fn transaction_info(&self) -> Option<&TransactionInfo> {
        self.backend.info()
    }

    /// Execute a modifying descriptor.
    pub fn execute(&mut self, descriptor: &StatementDescriptor) -> Result<ExecutionResult> {
        self.execute_returning(descriptor, &mut [])
    }

    /// Execute a modifying descriptor, binding generated keys back into
    /// the caller's rows by position.
    pub fn execute_returning(
        &mut self,
        descriptor: &StatementDescriptor,
        rows: &mut [Row],
    ) -> Result<ExecutionResult> {
        self.ensure_open()?;
        let ctx = ExecutionContext {
            in_transaction: self.backend.in_transaction(),
        };
        let result = self
            .coordinator
            .execute_returning(&mut self.driver, descriptor, &ctx, rows);
        if let Err(e) = &result {
            // a torn pair must not be commitable
            if matches!(e.primary(), Error::ParentChildMismatch { .. })
                && self.backend.in_transaction()
            {
                if let Err(mark) = self.backend.mark_rollback_only() {
                    tracing::warn!(error = %mark, "could not latch rollback-only after pair mismatch");
                }
            }
        }
        result
    }

    /// Open a row stream for a query descriptor. The stream mutably
    /// borrows the session, so no other statement can run until it is
    /// closed or dropped.
    pub fn query(&mut self, descriptor: &StatementDescriptor) -> Result<RowStream<'_>> {
        self.ensure_open()?;
        self.coordinator.query(&mut self.driver, descriptor)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the session. Idempotent. A live transaction is rolled back
    /// first; every later call on the session fails with `SessionClosed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.backend.abandon(&mut self.driver) {
            tracing::warn!(error = %e, "rollback on session close failed");
            return Err(e);
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }
}

impl<D: DriverBinding> Session<D, LocalBackend> {
    pub fn new(driver: D) -> Self {
        Self::open(driver)
    }

    /// Begin a database transaction.
    pub fn begin(&mut self, options: &TransactionOptions) -> Result<()> {
        self.ensure_open()?;
        self.backend
            .tx
            .begin(&mut self.driver, TransactionMode::Database, options)
    }

    /// Begin a pseudo transaction: transaction-shaped session state with
    /// zero driver round trips.
    pub fn begin_pseudo(&mut self, options: &TransactionOptions) -> Result<()> {
        self.ensure_open()?;
        self.backend
            .tx
            .begin(&mut self.driver, TransactionMode::Pseudo, options)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.backend.tx.commit(&mut self.driver)
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.backend.tx.rollback(&mut self.driver)
    }

    pub fn create_savepoint(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.ensure_savepoints()?;
        self.backend.tx.create_savepoint(&mut self.driver, name)
    }

    pub fn release_savepoint(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.ensure_savepoints()?;
        self.backend.tx.release_savepoint(&mut self.driver, name)
    }

    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.ensure_savepoints()?;
        self.backend
            .tx
            .rollback_to_savepoint(&mut self.driver, name)
    }

    fn ensure_savepoints(&self) -> Result<()> {
        // pseudo transactions track savepoints purely in-process
        if self.capabilities().savepoints || self.backend.tx.mode() == TransactionMode::Pseudo {
            Ok(())
        } else {
            Err(Error::Unsupported("savepoints".to_string()))
        }
    }
}

impl<D: DriverBinding> Session<D, XaBackend> {
    pub fn new(driver: D) -> Self {
        Self::open(driver)
    }

    pub fn xa_state(&self) -> crate::transaction::XaBranchState {
        self.backend.tx.state()
    }

    pub fn xa_start(&mut self, xid: Xid, flags: XaFlags, options: &TransactionOptions) -> Result<()> {
        self.ensure_open()?;
        self.backend.tx.start(&mut self.driver, xid, flags, options)
    }

    pub fn xa_end(&mut self, xid: &Xid, flags: XaFlags) -> Result<()> {
        self.ensure_open()?;
        self.backend.tx.end(&mut self.driver, xid, flags)
    }

    pub fn xa_prepare(&mut self, xid: &Xid) -> Result<()> {
        self.ensure_open()?;
        self.backend.tx.prepare(&mut self.driver, xid)
    }

    pub fn xa_commit(&mut self, xid: &Xid, flags: XaFlags) -> Result<()> {
        self.ensure_open()?;
        self.backend.tx.commit(&mut self.driver, xid, flags)
    }

    pub fn xa_rollback(&mut self, xid: &Xid) -> Result<()> {
        self.ensure_open()?;
        self.backend.tx.rollback(&mut self.driver, xid)
    }

    pub fn xa_forget(&mut self, xid: &Xid) -> Result<()> {
        self.ensure_open()?;
        self.backend.tx.forget(&mut self.driver, xid)
    }

    pub fn xa_recover(&mut self) -> Result<Vec<Xid>> {
        self.ensure_open()?;
        self.backend.tx.recover(&mut self.driver)
    }
}
