//! Cooperative cancellation
//!
//! The token is the only part of a session designed to be touched from a
//! thread other than the one driving execution. Raising it never closes
//! anything by itself; the stream honors the flag at the next row boundary
//! on its own thread, so a cancel racing a close can never double-free the
//! underlying cursor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for one row stream.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; returns `true` for the call that
    /// actually flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
