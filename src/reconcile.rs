//! Affected-row reconciliation
//!
//! Pure, stateless checks invoked by the coordinator after every statement
//! execution that declares expectations. An outcome is never silently
//! ignored: callers either inspect it or convert it with
//! [`ReconciliationOutcome::into_result`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Result of validating an affected-row count against the statement's
/// declared expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationOutcome {
    Ok,
    /// Zero rows were affected under an optimistic-lock expectation. The
    /// index identifies the batch item (0 for a simple statement).
    OptimisticLockFailed { index: usize },
    /// The two members of a pair affected different row counts: a
    /// data-integrity break between the tables backing one logical entity.
    ParentChildMismatch { first: u64, second: u64 },
    /// The driver produced a different number of per-item results than the
    /// submitted batch size.
    BatchSizeMismatch { expected: usize, actual: usize },
}

impl ReconciliationOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ReconciliationOutcome::Ok)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            ReconciliationOutcome::Ok => Ok(()),
            ReconciliationOutcome::OptimisticLockFailed { index } => {
                Err(Error::OptimisticLockFailed { index })
            }
            ReconciliationOutcome::ParentChildMismatch { first, second } => {
                Err(Error::ParentChildMismatch { first, second })
            }
            ReconciliationOutcome::BatchSizeMismatch { expected, actual } => {
                Err(Error::BatchSizeMismatch { expected, actual })
            }
        }
    }
}

/// Optimistic-lock check: an expecting statement that affected zero rows
/// has lost an update.
#[must_use]
pub fn check_optimistic_lock(expects_rows: bool, affected: u64, index: usize) -> ReconciliationOutcome {
    if expects_rows && affected == 0 {
        ReconciliationOutcome::OptimisticLockFailed { index }
    } else {
        ReconciliationOutcome::Ok
    }
}

/// Parent/child match: both members of a pair must affect the same number
/// of rows.
#[must_use]
pub fn check_pair(first: u64, second: u64) -> ReconciliationOutcome {
    if first == second {
        ReconciliationOutcome::Ok
    } else {
        ReconciliationOutcome::ParentChildMismatch { first, second }
    }
}

/// Batch size match: a partial batch result is always an error, never
/// silently truncated.
#[must_use]
pub fn check_batch_len(expected: usize, actual: usize) -> ReconciliationOutcome {
    if expected == actual {
        ReconciliationOutcome::Ok
    } else {
        ReconciliationOutcome::BatchSizeMismatch { expected, actual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimistic_lock_fails_only_on_zero_rows_with_expectation() {
        assert!(check_optimistic_lock(true, 1, 0).is_ok());
        assert!(check_optimistic_lock(false, 0, 0).is_ok());
        assert_eq!(
            check_optimistic_lock(true, 0, 3),
            ReconciliationOutcome::OptimisticLockFailed { index: 3 }
        );
    }

    #[test]
    fn pair_counts_must_match() {
        assert!(check_pair(2, 2).is_ok());
        assert_eq!(
            check_pair(2, 1).into_result().unwrap_err(),
            crate::error::Error::ParentChildMismatch { first: 2, second: 1 }
        );
    }

    #[test]
    fn partial_batch_results_are_an_error() {
        assert!(check_batch_len(3, 3).is_ok());
        assert_eq!(
            check_batch_len(3, 2),
            ReconciliationOutcome::BatchSizeMismatch {
                expected: 3,
                actual: 2
            }
        );
    }
}
