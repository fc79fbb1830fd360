//! JSONPath error types
//!
//! Compile errors carry the error kind plus the line and column where the
//! compiler gave up. Runtime failures inside filter expressions do not use
//! this type at all: they are reported through a side-channel
//! [`ErrorKind`] slot and the offending sub-expression yields JSON null.

mod types;

pub use types::{ErrorKind, JsonPathError, JsonPathResult};
