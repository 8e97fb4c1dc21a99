//! XA branch state machine
//!
//! Tracks the local branch of a distributed transaction and routes the
//! two-phase protocol verbs to the driver binding. Two-phase commit and
//! rollback by Xid deliberately do not require a matching local branch:
//! a recovering transaction manager may complete branches started by a
//! different process.

use crate::driver::DriverBinding;
use crate::error::{Error, Result};
use crate::transaction::info::{TransactionInfo, TransactionOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Global transaction identifier per the XA model.
///
/// Equality is structural; a branch is correlated across
/// `start`/`end`/`prepare`/`commit`/`rollback`/`forget` by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xid {
    format_id: i32,
    gtrid: Vec<u8>,
    bqual: Vec<u8>,
}

impl Xid {
    pub const MAX_GTRID_LEN: usize = 64;
    pub const MAX_BQUAL_LEN: usize = 64;

    pub fn new(
        format_id: i32,
        gtrid: impl Into<Vec<u8>>,
        bqual: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let gtrid = gtrid.into();
        let bqual = bqual.into();
        if gtrid.is_empty() || gtrid.len() > Self::MAX_GTRID_LEN {
            return Err(Error::XaProtocol(format!(
                "global transaction id must be 1..={} bytes, got {}",
                Self::MAX_GTRID_LEN,
                gtrid.len()
            )));
        }
        if bqual.len() > Self::MAX_BQUAL_LEN {
            return Err(Error::XaProtocol(format!(
                "branch qualifier must be at most {} bytes, got {}",
                Self::MAX_BQUAL_LEN,
                bqual.len()
            )));
        }
        Ok(Self {
            format_id,
            gtrid,
            bqual,
        })
    }

    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    pub fn global_transaction_id(&self) -> &[u8] {
        &self.gtrid
    }

    pub fn branch_qualifier(&self) -> &[u8] {
        &self.bqual
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:", self.format_id)?;
        for byte in &self.gtrid {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ":")?;
        for byte in &self.bqual {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// XA operation flags (X/Open `TM*` values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XaFlags(u32);

impl XaFlags {
    pub const NONE: XaFlags = XaFlags(0);
    pub const JOIN: XaFlags = XaFlags(0x0020_0000);
    pub const SUSPEND: XaFlags = XaFlags(0x0200_0000);
    pub const SUCCESS: XaFlags = XaFlags(0x0400_0000);
    pub const RESUME: XaFlags = XaFlags(0x0800_0000);
    pub const FAIL: XaFlags = XaFlags(0x2000_0000);
    pub const ONE_PHASE: XaFlags = XaFlags(0x4000_0000);

    pub fn contains(self, other: XaFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl Default for XaFlags {
    fn default() -> Self {
        XaFlags::NONE
    }
}

impl BitOr for XaFlags {
    type Output = XaFlags;

    fn bitor(self, rhs: XaFlags) -> XaFlags {
        XaFlags(self.0 | rhs.0)
    }
}

/// State of the local XA branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XaBranchState {
    NoTransaction,
    Active,
    Idle,
    Prepared,
    Committed,
    RolledBack,
}

impl fmt::Display for XaBranchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            XaBranchState::NoTransaction => "NoTransaction",
            XaBranchState::Active => "Active",
            XaBranchState::Idle => "Idle",
            XaBranchState::Prepared => "Prepared",
            XaBranchState::Committed => "Committed",
            XaBranchState::RolledBack => "RolledBack",
        };
        write!(f, "{}", name)
    }
}

struct XaBranch {
    xid: Xid,
    state: XaBranchState,
    rollback_only: bool,
    flags: XaFlags,
    options: TransactionOptions,
    info: TransactionInfo,
}

impl XaBranch {
    /// Replace the snapshot after a state change; the previous snapshot is
    /// discarded, never mutated.
    fn refresh(&mut self) {
        let started_at = self.info.started_at;
        let mut info =
            TransactionInfo::xa(&self.options, self.xid.clone(), self.state, self.flags);
        info.started_at = started_at;
        self.info = info;
    }
}

/// The distributed transaction state machine for one session.
#[derive(Default)]
pub struct XaTransaction {
    branch: Option<XaBranch>,
}

impl XaTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> XaBranchState {
        self.branch
            .as_ref()
            .map(|b| b.state)
            .unwrap_or(XaBranchState::NoTransaction)
    }

    pub fn xid(&self) -> Option<&Xid> {
        self.branch.as_ref().map(|b| &b.xid)
    }

    pub fn info(&self) -> Option<&TransactionInfo> {
        self.branch.as_ref().map(|b| &b.info)
    }

    pub fn in_transaction(&self) -> bool {
        self.state() == XaBranchState::Active
    }

    pub fn is_rollback_only(&self) -> bool {
        self.branch.as_ref().is_some_and(|b| b.rollback_only)
    }

    /// Latch the local branch rollback-only. Requires a live branch.
    pub fn mark_rollback_only(&mut self) -> Result<()> {
        match self.branch.as_mut() {
            Some(branch)
                if matches!(
                    branch.state,
                    XaBranchState::Active | XaBranchState::Idle | XaBranchState::Prepared
                ) =>
            {
                branch.rollback_only = true;
                Ok(())
            }
            _ => Err(Error::IllegalTransactionState {
                expected: "Active".to_string(),
                actual: self.state().to_string(),
            }),
        }
    }

    /// Start (or join/resume) a branch for `xid`.
    pub fn start(
        &mut self,
        driver: &mut dyn DriverBinding,
        xid: Xid,
        flags: XaFlags,
        options: &TransactionOptions,
    ) -> Result<()> {
        match self.state() {
            XaBranchState::NoTransaction | XaBranchState::Committed | XaBranchState::RolledBack => {
            }
            actual => {
                return Err(Error::IllegalTransactionState {
                    expected: "NoTransaction".to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        driver.xa_start(&xid, flags)?;
        tracing::debug!(xid = %xid, "xa branch started");
        let info = TransactionInfo::xa(options, xid.clone(), XaBranchState::Active, flags);
        self.branch = Some(XaBranch {
            xid,
            state: XaBranchState::Active,
            rollback_only: false,
            flags,
            options: options.clone(),
            info,
        });
        Ok(())
    }

    /// End the association with the branch. A `TMFAIL`-flagged end marks
    /// the branch rollback-only.
    pub fn end(&mut self, driver: &mut dyn DriverBinding, xid: &Xid, flags: XaFlags) -> Result<()> {
        {
            let branch = self.owned_branch(xid, "end")?;
            if branch.state != XaBranchState::Active {
                return Err(Error::IllegalTransactionState {
                    expected: XaBranchState::Active.to_string(),
                    actual: branch.state.to_string(),
                });
            }
        }
        driver.xa_end(xid, flags)?;
        if let Some(branch) = self.branch.as_mut() {
            branch.state = XaBranchState::Idle;
            branch.flags = flags;
            if flags.contains(XaFlags::FAIL) {
                branch.rollback_only = true;
                tracing::debug!(xid = %xid, "xa branch ended with TMFAIL, latched rollback-only");
            }
            branch.refresh();
        }
        Ok(())
    }

    /// First phase of two-phase commit.
    pub fn prepare(&mut self, driver: &mut dyn DriverBinding, xid: &Xid) -> Result<()> {
        {
            let branch = self.owned_branch(xid, "prepare")?;
            if branch.state != XaBranchState::Idle {
                return Err(Error::IllegalTransactionState {
                    expected: XaBranchState::Idle.to_string(),
                    actual: branch.state.to_string(),
                });
            }
            if branch.rollback_only {
                return Err(Error::RollbackOnly);
            }
        }
        driver.xa_prepare(xid)?;
        if let Some(branch) = self.branch.as_mut() {
            branch.state = XaBranchState::Prepared;
            branch.refresh();
        }
        Ok(())
    }

    /// Commit the branch identified by `xid`.
    ///
    /// One-phase commit is only legal on the session's own branch. A
    /// two-phase commit with no matching local branch routes directly to
    /// the driver (recovery path).
    pub fn commit(
        &mut self,
        driver: &mut dyn DriverBinding,
        xid: &Xid,
        flags: XaFlags,
    ) -> Result<()> {
        let one_phase = flags.contains(XaFlags::ONE_PHASE);
        let owns_branch = self.branch.as_ref().is_some_and(|b| &b.xid == xid);

        if !owns_branch {
            if one_phase {
                return Err(Error::XaProtocol(format!(
                    "one-phase commit of {} requires the owning branch",
                    xid
                )));
            }
            tracing::debug!(xid = %xid, "two-phase commit of a foreign branch (recovery)");
            return driver.xa_commit(xid, false);
        }

        {
            let branch = self.owned_branch(xid, "commit")?;
            if branch.rollback_only {
                return Err(Error::RollbackOnly);
            }
            let expected = if one_phase {
                XaBranchState::Idle
            } else {
                XaBranchState::Prepared
            };
            if branch.state != expected {
                return Err(Error::IllegalTransactionState {
                    expected: expected.to_string(),
                    actual: branch.state.to_string(),
                });
            }
        }
        driver.xa_commit(xid, one_phase)?;
        if let Some(branch) = self.branch.as_mut() {
            branch.state = XaBranchState::Committed;
            branch.refresh();
        }
        tracing::debug!(xid = %xid, one_phase, "xa branch committed");
        Ok(())
    }

    /// Roll back the branch identified by `xid`. With no matching local
    /// branch the call routes directly to the driver (external rollback of
    /// a branch started elsewhere).
    pub fn rollback(&mut self, driver: &mut dyn DriverBinding, xid: &Xid) -> Result<()> {
        let owns_branch = self.branch.as_ref().is_some_and(|b| &b.xid == xid);
        if !owns_branch {
            tracing::debug!(xid = %xid, "rolling back a foreign branch");
            return driver.xa_rollback(xid);
        }

        {
            let branch = self.owned_branch(xid, "rollback")?;
            if !matches!(branch.state, XaBranchState::Idle | XaBranchState::Prepared) {
                return Err(Error::IllegalTransactionState {
                    expected: XaBranchState::Idle.to_string(),
                    actual: branch.state.to_string(),
                });
            }
        }
        driver.xa_rollback(xid)?;
        if let Some(branch) = self.branch.as_mut() {
            branch.state = XaBranchState::RolledBack;
            // completing the rollback clears the latch
            branch.rollback_only = false;
            branch.refresh();
        }
        tracing::debug!(xid = %xid, "xa branch rolled back");
        Ok(())
    }

    /// Discard knowledge of a heuristically completed branch.
    pub fn forget(&mut self, driver: &mut dyn DriverBinding, xid: &Xid) -> Result<()> {
        driver.xa_forget(xid)?;
        if self.branch.as_ref().is_some_and(|b| &b.xid == xid) {
            self.branch = None;
        }
        Ok(())
    }

    /// List prepared or heuristically completed branches known to the
    /// resource manager.
    pub fn recover(&self, driver: &mut dyn DriverBinding) -> Result<Vec<Xid>> {
        driver.xa_recover()
    }

    fn owned_branch(&self, xid: &Xid, verb: &str) -> Result<&XaBranch> {
        self.branch
            .as_ref()
            .filter(|b| &b.xid == xid)
            .ok_or_else(|| Error::XaProtocol(format!("{}: no local branch for {}", verb, xid)))
    }
}
