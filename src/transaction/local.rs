//! Local transaction state machine
//!
//! One connection-local transaction at a time, with named savepoints and a
//! rollback-only latch. Commit and rollback are the only exits from a
//! failed verb; a transaction that failed to commit can still be rolled
//! back, and a transaction that failed to roll back can be retried.

use crate::driver::DriverBinding;
use crate::error::{Error, Result};
use crate::transaction::info::{TransactionInfo, TransactionMode, TransactionOptions};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the session's local transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalState {
    NotActive,
    Active,
    Committing,
    Committed,
    FailedCommit,
    RollingBack,
    RolledBack,
    FailedRollback,
}

impl fmt::Display for LocalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocalState::NotActive => "NotActive",
            LocalState::Active => "Active",
            LocalState::Committing => "Committing",
            LocalState::Committed => "Committed",
            LocalState::FailedCommit => "FailedCommit",
            LocalState::RollingBack => "RollingBack",
            LocalState::RolledBack => "RolledBack",
            LocalState::FailedRollback => "FailedRollback",
        };
        write!(f, "{}", name)
    }
}

/// The local transaction state machine for one session.
pub struct LocalTransaction {
    state: LocalState,
    rollback_only: bool,
    mode: TransactionMode,
    info: Option<TransactionInfo>,
    /// Live savepoint names, oldest first. Rolling back to a savepoint
    /// implicitly releases every savepoint created after it.
    savepoints: Vec<String>,
}

impl LocalTransaction {
    pub fn new() -> Self {
        Self {
            state: LocalState::NotActive,
            rollback_only: false,
            mode: TransactionMode::Database,
            info: None,
            savepoints: Vec::new(),
        }
    }

    pub fn state(&self) -> LocalState {
        self.state
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn info(&self) -> Option<&TransactionInfo> {
        self.info.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.state == LocalState::Active
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Latch the transaction rollback-only. Only meaningful while active.
    pub fn mark_rollback_only(&mut self) -> Result<()> {
        self.expect(LocalState::Active)?;
        self.rollback_only = true;
        tracing::debug!("transaction latched rollback-only");
        Ok(())
    }

    /// Begin a transaction. Terminal states count as no transaction, so a
    /// session can run transactions back to back. A pseudo transaction
    /// tracks the same state with zero driver calls.
    pub fn begin(
        &mut self,
        driver: &mut dyn DriverBinding,
        mode: TransactionMode,
        options: &TransactionOptions,
    ) -> Result<()> {
        match self.state {
            LocalState::NotActive | LocalState::Committed | LocalState::RolledBack => {}
            actual => {
                return Err(Error::IllegalTransactionState {
                    expected: LocalState::NotActive.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        if mode == TransactionMode::Database {
            driver.begin(options)?;
        }
        tracing::debug!(?mode, "transaction started");
        self.state = LocalState::Active;
        self.rollback_only = false;
        self.mode = mode;
        self.info = Some(TransactionInfo::local(options));
        self.savepoints.clear();
        Ok(())
    }

    /// Commit. A rollback-only transaction refuses without touching the
    /// driver; a driver failure leaves the machine in `FailedCommit`, from
    /// which only rollback proceeds.
    pub fn commit(&mut self, driver: &mut dyn DriverBinding) -> Result<()> {
        self.expect(LocalState::Active)?;
        if self.rollback_only {
            return Err(Error::RollbackOnly);
        }
        self.state = LocalState::Committing;
        if self.mode == TransactionMode::Database {
            if let Err(e) = driver.commit() {
                self.state = LocalState::FailedCommit;
                tracing::warn!(error = %e, "commit failed");
                return Err(e);
            }
        }
        self.state = LocalState::Committed;
        self.finish();
        tracing::debug!("transaction committed");
        Ok(())
    }

    /// Roll back. Legal from `Active` and from either failed verb state; a
    /// successful rollback clears the rollback-only latch.
    pub fn rollback(&mut self, driver: &mut dyn DriverBinding) -> Result<()> {
        match self.state {
            LocalState::Active | LocalState::FailedCommit | LocalState::FailedRollback => {}
            actual => {
                return Err(Error::IllegalTransactionState {
                    expected: LocalState::Active.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        self.state = LocalState::RollingBack;
        if self.mode == TransactionMode::Database {
            if let Err(e) = driver.rollback() {
                self.state = LocalState::FailedRollback;
                tracing::warn!(error = %e, "rollback failed");
                return Err(e);
            }
        }
        self.state = LocalState::RolledBack;
        self.rollback_only = false;
        self.finish();
        tracing::debug!("transaction rolled back");
        Ok(())
    }

    /// Create a named savepoint inside the active transaction.
    pub fn create_savepoint(&mut self, driver: &mut dyn DriverBinding, name: &str) -> Result<()> {
        self.expect(LocalState::Active)?;
        if self.savepoints.iter().any(|s| s == name) {
            return Err(Error::DuplicateSavepoint(name.to_string()));
        }
        if self.mode == TransactionMode::Database {
            driver.savepoint(name)?;
        }
        self.savepoints.push(name.to_string());
        Ok(())
    }

    /// Release a savepoint and everything created after it.
    pub fn release_savepoint(&mut self, driver: &mut dyn DriverBinding, name: &str) -> Result<()> {
        self.expect(LocalState::Active)?;
        let position = self.savepoint_position(name)?;
        if self.mode == TransactionMode::Database {
            driver.release_savepoint(name)?;
        }
        self.savepoints.truncate(position);
        Ok(())
    }

    /// Roll back to a savepoint. The savepoint itself stays live; anything
    /// created after it is gone.
    pub fn rollback_to_savepoint(
        &mut self,
        driver: &mut dyn DriverBinding,
        name: &str,
    ) -> Result<()> {
        self.expect(LocalState::Active)?;
        let position = self.savepoint_position(name)?;
        if self.mode == TransactionMode::Database {
            driver.rollback_to_savepoint(name)?;
        }
        self.savepoints.truncate(position + 1);
        Ok(())
    }

    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    fn savepoint_position(&self, name: &str) -> Result<usize> {
        self.savepoints
            .iter()
            .position(|s| s == name)
            .ok_or_else(|| Error::UnknownSavepoint(name.to_string()))
    }

    fn expect(&self, expected: LocalState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::IllegalTransactionState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    fn finish(&mut self) {
        self.savepoints.clear();
        if let Some(info) = self.info.as_mut() {
            info.in_transaction = false;
        }
    }
}

impl Default for LocalTransaction {
    fn default() -> Self {
        Self::new()
    }
}
