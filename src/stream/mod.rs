//! Lazily-pulled row streaming with cooperative cancellation

mod cancel;
mod engine;

pub use cancel::CancellationToken;
pub use engine::{RowBlock, RowStream};
