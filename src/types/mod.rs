//! Logical values and rows exchanged with the driver binding.

mod value;

pub use value::{ParamGroup, Row, Value};
