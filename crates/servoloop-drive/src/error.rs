//! Drive stack errors.

use servoloop_errors::{ConfigError, RTError, ServoError};
use servoloop_feedback::FeedbackError;
use servoloop_motion::MotionError;
use servoloop_motorcontrol::MotorcontrolError;
use servoloop_watchdog::WatchdogError;
use thiserror::Error;

/// Errors returned while starting or stopping a drive.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriveError {
    /// The configuration was rejected.
    #[error("Invalid drive configuration: {0}")]
    Config(#[from] ConfigError),

    /// A task could not be started or stopped cleanly.
    #[error("Task error: {0}")]
    Rt(#[from] RTError),

    /// The watchdog refused to start.
    #[error("Watchdog error: {0}")]
    Watchdog(#[from] WatchdogError),

    /// A position feedback request failed.
    #[error(transparent)]
    Feedback(#[from] FeedbackError),

    /// A motorcontrol request failed.
    #[error(transparent)]
    Motorcontrol(#[from] MotorcontrolError),

    /// A motion control request failed.
    #[error(transparent)]
    Motion(#[from] MotionError),
}

/// Result type for drive operations.
pub type DriveResult<T> = Result<T, DriveError>;

impl From<DriveError> for ServoError {
    fn from(e: DriveError) -> Self {
        match e {
            DriveError::Config(e) => ServoError::Config(e),
            DriveError::Rt(e) => ServoError::RT(e),
            DriveError::Watchdog(WatchdogError::Faulted(code)) => ServoError::Fault(code),
            DriveError::Watchdog(e) => ServoError::Other(e.to_string()),
            DriveError::Feedback(e) => e.into(),
            DriveError::Motorcontrol(e) => e.into(),
            DriveError::Motion(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servoloop_errors::{ErrorCategory, FaultCode};

    #[test]
    fn test_watchdog_fault_maps_to_fault() {
        let err: ServoError = DriveError::Watchdog(WatchdogError::Faulted(FaultCode::OverVoltage)).into();
        assert_eq!(err.category(), ErrorCategory::Fault);
    }

    #[test]
    fn test_nested_errors_keep_their_category() {
        let err: ServoError = DriveError::Motion(MotionError::Rt(RTError::ServiceTimeout)).into();
        assert_eq!(err.category(), ErrorCategory::RT);
        let err: ServoError = DriveError::from(ConfigError::zero("periods.motion_us")).into();
        assert_eq!(err.category(), ErrorCategory::Config);
    }
}
