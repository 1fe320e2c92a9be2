//! Centralized error types for the servoloop control stack
//!
//! Errors in a motor drive fall into classes that are handled very
//! differently, and this crate keeps them apart in the type system:
//!
//! - [`fault`]: protection faults ([`FaultCode`]). Latched, force a safe
//!   output state, only cleared by an explicit reset.
//! - [`decode`]: sensor decode results ([`DecodeStatus`]). Absorbed at the
//!   sensor layer by holding the last valid reading.
//! - [`rt`]: real-time task and request/response errors ([`RTError`]).
//! - [`config`]: configuration errors ([`ConfigError`]).
//! - [`common`]: the top-level [`ServoError`] plus classification helpers.
//!
//! # RT Safety
//!
//! [`FaultCode`], [`DecodeStatus`] and [`RTError`] are `Copy`, `#[repr(u8)]`
//! and carry no heap data, so they can be produced and stored from periodic
//! tasks without allocating.
//!
//! # Example
//!
//! ```
//! use servoloop_errors::prelude::*;
//!
//! fn check_bus(v_dc: u32, min: u32) -> Result<u32> {
//!     if v_dc < min {
//!         return Err(FaultCode::UnderVoltage.into());
//!     }
//!     Ok(v_dc)
//! }
//!
//! assert!(check_bus(12, 24).is_err());
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod common;
pub mod config;
pub mod decode;
pub mod fault;
pub mod prelude;
pub mod rt;

pub use common::{ErrorCategory, ErrorSeverity, ServoError, TuningError};
pub use config::ConfigError;
pub use decode::DecodeStatus;
pub use fault::FaultCode;
pub use rt::RTError;

/// A specialized `Result` type for servoloop operations.
pub type Result<T> = std::result::Result<T, ServoError>;

/// A specialized `Result` type for real-time operations.
pub type RTResult<T = ()> = std::result::Result<T, RTError>;
