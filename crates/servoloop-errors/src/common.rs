//! Common error types and utilities used across all servoloop crates.
//!
//! This module provides the top-level error enum that can wrap all sub-errors,
//! along with error classification and severity levels.

use core::fmt;

use crate::{ConfigError, DecodeStatus, FaultCode, RTError};

/// Top-level error type that can wrap all servoloop sub-errors.
#[derive(Debug, thiserror::Error)]
pub enum ServoError {
    /// Real-time operation errors
    #[error("RT error: {0}")]
    RT(#[from] RTError),

    /// Latched protection fault
    #[error("Fault: {0}")]
    Fault(#[from] FaultCode),

    /// Sensor decode error surfaced to a caller
    #[error("Decode error: {0}")]
    Decode(DecodeStatus),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Auto-tuning did not converge
    #[error("Tuning error: {0}")]
    Tuning(#[from] TuningError),

    /// Anything else, with a message
    #[error("{0}")]
    Other(String),
}

impl ServoError {
    /// Category used to route the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServoError::RT(_) => ErrorCategory::RT,
            ServoError::Fault(_) => ErrorCategory::Fault,
            ServoError::Decode(_) => ErrorCategory::Decode,
            ServoError::Config(_) => ErrorCategory::Config,
            ServoError::Tuning(_) => ErrorCategory::Tuning,
            ServoError::Other(_) => ErrorCategory::Other,
        }
    }

    /// How serious the error is.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ServoError::RT(e) => e.severity(),
            ServoError::Fault(f) => f.severity(),
            ServoError::Decode(_) => ErrorSeverity::Warning,
            ServoError::Config(e) => e.severity(),
            ServoError::Tuning(_) => ErrorSeverity::Warning,
            ServoError::Other(_) => ErrorSeverity::Error,
        }
    }

    /// `true` unless the error is critical.
    pub fn is_recoverable(&self) -> bool {
        self.severity() < ErrorSeverity::Critical
    }

    /// Error from a free-form message.
    pub fn other(msg: impl Into<String>) -> Self {
        ServoError::Other(msg.into())
    }
}

impl From<DecodeStatus> for ServoError {
    fn from(status: DecodeStatus) -> Self {
        ServoError::Decode(status)
    }
}

/// Auto-tuning failure. The active controller gains are left untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TuningError {
    /// The motor did not move under the test excitation
    #[error("No motion detected during tuning")]
    NoMotion,

    /// The response did not settle inside the measurement window
    #[error("Response did not settle within {samples} samples")]
    NotSettled {
        /// Number of samples recorded
        samples: usize,
    },

    /// Identified plant parameters are not physical
    #[error("Identified parameters are not physical (J = {inertia}, f = {friction})")]
    NonPhysical {
        /// Identified moment of inertia
        inertia: f64,
        /// Identified viscous friction
        friction: f64,
    },

    /// Computed gains would exceed the overshoot criterion
    #[error("Predicted overshoot {predicted:.1}% exceeds limit {limit:.1}%")]
    Overshoot {
        /// Predicted overshoot in percent
        predicted: f64,
        /// Allowed overshoot in percent
        limit: f64,
    },

    /// The tuner is not currently running
    #[error("Tuner is not running")]
    NotRunning,
}

/// Coarse class of a [`ServoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Real-time operation errors
    RT = 0,
    /// Protection faults
    Fault = 1,
    /// Sensor decode errors
    Decode = 2,
    /// Configuration errors
    Config = 3,
    /// Auto-tuning errors
    Tuning = 4,
    /// Other errors
    Other = 255,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::RT => write!(f, "RT"),
            ErrorCategory::Fault => write!(f, "Fault"),
            ErrorCategory::Decode => write!(f, "Decode"),
            ErrorCategory::Config => write!(f, "Config"),
            ErrorCategory::Tuning => write!(f, "Tuning"),
            ErrorCategory::Other => write!(f, "Other"),
        }
    }
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ErrorSeverity {
    /// Informational, no action required
    Info = 0,
    /// Warning, may require attention
    Warning = 1,
    /// Error, operation failed
    Error = 2,
    /// Critical, system may be in unstable state
    Critical = 3,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
