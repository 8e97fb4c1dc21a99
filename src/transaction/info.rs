//! Immutable transaction snapshots

use crate::transaction::xa::{XaBranchState, XaFlags, Xid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Options for starting a transaction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
    pub timeout: Option<Duration>,
}

/// How a local transaction is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionMode {
    /// A real database transaction driven through the binding.
    Database,
    /// Transaction-shaped state tracked purely in-process, with zero driver
    /// calls. Used for read-only framework integration.
    Pseudo,
}

/// XA branch part of a transaction snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XaInfo {
    pub xid: Xid,
    pub state: XaBranchState,
    pub flags: XaFlags,
}

/// Immutable snapshot of the session's transaction state.
///
/// A new snapshot is created on every state transition and replaces the
/// previous one; a snapshot is never mutated in place and never shared
/// across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub isolation: IsolationLevel,
    pub read_only: bool,
    pub in_transaction: bool,
    pub started_at: DateTime<Utc>,
    pub timeout: Option<Duration>,
    pub xa: Option<XaInfo>,
}

impl TransactionInfo {
    pub(crate) fn local(options: &TransactionOptions) -> Self {
        Self {
            isolation: options.isolation,
            read_only: options.read_only,
            in_transaction: true,
            started_at: Utc::now(),
            timeout: options.timeout,
            xa: None,
        }
    }

    pub(crate) fn xa(
        options: &TransactionOptions,
        xid: Xid,
        state: XaBranchState,
        flags: XaFlags,
    ) -> Self {
        Self {
            isolation: options.isolation,
            read_only: options.read_only,
            in_transaction: state == XaBranchState::Active,
            started_at: Utc::now(),
            timeout: options.timeout,
            xa: Some(XaInfo { xid, state, flags }),
        }
    }
}
