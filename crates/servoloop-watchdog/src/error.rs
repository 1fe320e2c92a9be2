//! Error types for watchdog operations.

use servoloop_errors::FaultCode;

/// Errors that can occur during watchdog operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchdogError {
    /// Watchdog is not running.
    #[error("Watchdog is not running")]
    NotRunning,
    /// State transition not allowed.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: &'static str,
        /// Attempted target state.
        to: &'static str,
    },
    /// A fault is latched; outputs stay disabled until it is reset.
    #[error("Fault latched: {0}")]
    Faulted(FaultCode),
}

impl WatchdogError {
    /// Create an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: &'static str, to: &'static str) -> Self {
        Self::InvalidTransition { from, to }
    }
}

/// A specialized `Result` type for watchdog operations.
pub type WatchdogResult<T> = core::result::Result<T, WatchdogError>;
