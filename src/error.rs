//! Error types for the runtime

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad error category, used by callers to pick a handling policy.
///
/// The runtime never retries on its own; the category tells the caller
/// which failures are programming errors, which are expected data
/// conditions, and which came from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Programming-contract violation. Always fatal, never retried.
    Contract,
    /// An affected-row expectation was not met.
    Reconciliation,
    /// The underlying driver or transport failed.
    Driver,
    /// A statement deadline elapsed before the round trip could be issued
    /// or completed.
    Timeout,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Contract violations
    #[error("Illegal transaction state: expected {expected}, actual {actual}")]
    IllegalTransactionState { expected: String, actual: String },

    #[error("Paired statement issued outside a transaction")]
    ChildWithoutTransaction,

    #[error("A result cursor is already open on this connection")]
    CursorAlreadyOpen,

    #[error("Unknown savepoint: {0}")]
    UnknownSavepoint(String),

    #[error("Duplicate savepoint: {0}")]
    DuplicateSavepoint(String),

    #[error("Invalid statement descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Column index {index} out of range for row of width {width}")]
    ColumnOutOfRange { index: usize, width: usize },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Operation not supported by this driver: {0}")]
    Unsupported(String),

    #[error("Transaction is marked rollback-only")]
    RollbackOnly,

    #[error("XA protocol violation: {0}")]
    XaProtocol(String),

    // Reconciliation failures
    #[error("Optimistic lock failed at index {index}: no rows affected")]
    OptimisticLockFailed { index: usize },

    #[error("Parent/child row count mismatch: first member affected {first}, second member affected {second}")]
    ParentChildMismatch { first: u64, second: u64 },

    #[error("Batch size mismatch: expected {expected} results, driver produced {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("Generated key count mismatch: expected {expected}, driver reported {actual}")]
    GeneratedKeyCountMismatch { expected: usize, actual: usize },

    // Driver/transport failures, wrapped uniformly
    #[error("Driver error: {0}")]
    Driver(String),

    // Timeout
    #[error("Statement deadline exceeded")]
    Timeout,

    /// A primary error with a secondary failure that happened while
    /// cleaning up on the error path. The suppressed cause never replaces
    /// the primary error.
    #[error("{primary} (suppressed: {suppressed})")]
    WithSuppressed {
        primary: Box<Error>,
        suppressed: Box<Error>,
    },
}

impl Error {
    /// Attach a secondary cleanup failure to this error.
    pub fn with_suppressed(self, suppressed: Error) -> Error {
        Error::WithSuppressed {
            primary: Box::new(self),
            suppressed: Box::new(suppressed),
        }
    }

    /// The primary error, unwrapping any suppressed-cause chain.
    pub fn primary(&self) -> &Error {
        match self {
            Error::WithSuppressed { primary, .. } => primary.primary(),
            other => other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::IllegalTransactionState { .. }
            | Error::ChildWithoutTransaction
            | Error::CursorAlreadyOpen
            | Error::UnknownSavepoint(_)
            | Error::DuplicateSavepoint(_)
            | Error::InvalidDescriptor(_)
            | Error::ColumnOutOfRange { .. }
            | Error::SessionClosed
            | Error::Unsupported(_)
            | Error::RollbackOnly
            | Error::XaProtocol(_) => ErrorCategory::Contract,

            Error::OptimisticLockFailed { .. }
            | Error::ParentChildMismatch { .. }
            | Error::BatchSizeMismatch { .. }
            | Error::GeneratedKeyCountMismatch { .. } => ErrorCategory::Reconciliation,

            Error::Driver(_) => ErrorCategory::Driver,

            Error::Timeout => ErrorCategory::Timeout,

            Error::WithSuppressed { primary, .. } => primary.category(),
        }
    }
}
