//! Local and distributed (XA) transaction state machines
//!
//! Transitions are explicit: every transition method takes (or implies) the
//! expected prior state and returns an error on mismatch, so an illegal
//! transition is a visible return path rather than an assertion.

mod info;
mod local;
mod xa;

pub use info::{IsolationLevel, TransactionInfo, TransactionMode, TransactionOptions, XaInfo};
pub use local::{LocalState, LocalTransaction};
pub use xa::{XaBranchState, XaFlags, XaTransaction, Xid};
