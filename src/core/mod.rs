//! Core types shared across the crate.

pub mod error;
pub mod value;

pub use error::{CodecError, CrcScope, Result};
pub use value::{MessageValue, Value};
