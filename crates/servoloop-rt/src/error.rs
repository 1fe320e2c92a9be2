//! Error types for the runtime crate.
//!
//! The runtime shares [`RTError`] with the rest of the stack so that a
//! deadline miss reported by a task thread can be matched on directly.

pub use servoloop_errors::{RTError, RTResult};
