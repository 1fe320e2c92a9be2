//! Prelude module for convenient error handling imports.
//!
//! ```
//! use servoloop_errors::prelude::*;
//!
//! let status = DecodeStatus::CrcError;
//! assert!(!status.is_ok());
//! ```

pub use crate::{
    RTResult, Result,
    common::{ErrorCategory, ErrorSeverity, ServoError, TuningError},
    config::ConfigError,
    decode::DecodeStatus,
    fault::FaultCode,
    rt::RTError,
};
