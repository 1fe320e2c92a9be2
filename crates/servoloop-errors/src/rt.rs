//! Errors raised on the periodic task paths.
//!
//! [`RTError`] is `Copy` and fits in a byte, so a task can return or store
//! it without allocating.

use core::fmt;

use crate::common::ErrorSeverity;

/// Task and request errors, one byte each.
///
/// # Examples
///
/// ```
/// use servoloop_errors::{RTError, ErrorSeverity};
///
/// let err = RTError::DeadlineMissed;
/// assert_eq!(err.code(), 1);
/// assert_eq!(err.severity(), ErrorSeverity::Critical);
/// assert!(err.requires_safety_action());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RTError {
    /// A periodic task did not finish within its period
    DeadlineMissed = 1,
    /// The peer end of a request/response channel was dropped
    ChannelClosed = 2,
    /// A request was not answered within the calling cycle
    ServiceTimeout = 3,
    /// A command was rejected because the outputs are disabled
    OutputsDisabled = 4,
    /// A task thread could not be spawned
    ThreadSpawn = 5,
}

impl RTError {
    /// Numeric code of the error.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Severity of the error.
    pub fn severity(self) -> ErrorSeverity {
        match self {
            RTError::DeadlineMissed => ErrorSeverity::Critical,
            RTError::ChannelClosed => ErrorSeverity::Critical,
            RTError::ServiceTimeout => ErrorSeverity::Error,
            RTError::OutputsDisabled => ErrorSeverity::Warning,
            RTError::ThreadSpawn => ErrorSeverity::Critical,
        }
    }

    /// `true` if outputs must be disabled.
    pub fn requires_safety_action(self) -> bool {
        matches!(self, RTError::DeadlineMissed | RTError::ChannelClosed)
    }

    /// Error for a numeric code.
    ///
    /// Returns `None` if the code does not correspond to a known error.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RTError::DeadlineMissed),
            2 => Some(RTError::ChannelClosed),
            3 => Some(RTError::ServiceTimeout),
            4 => Some(RTError::OutputsDisabled),
            5 => Some(RTError::ThreadSpawn),
            _ => None,
        }
    }
}

impl fmt::Display for RTError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RTError::DeadlineMissed => write!(f, "RT deadline missed"),
            RTError::ChannelClosed => write!(f, "Service channel closed"),
            RTError::ServiceTimeout => write!(f, "Service did not reply within the cycle"),
            RTError::OutputsDisabled => write!(f, "Outputs disabled"),
            RTError::ThreadSpawn => write!(f, "Failed to spawn task thread"),
        }
    }
}

impl std::error::Error for RTError {}
