//! Motion control errors.

use servoloop_errors::{ConfigError, FaultCode, RTError, ServoError};
use servoloop_motorcontrol::MotorcontrolError;
use thiserror::Error;

use crate::config::ControlStrategy;

/// Errors returned by the coordinator and [`crate::MotionControlClient`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    /// The service did not answer.
    #[error("Motion control service error: {0}")]
    Rt(#[from] RTError),

    /// A new configuration was rejected; the previous one stays active.
    #[error("Invalid motion control configuration: {0}")]
    Config(#[from] ConfigError),

    /// A request forwarded to motorcontrol failed.
    #[error(transparent)]
    Motorcontrol(#[from] MotorcontrolError),

    /// Control cannot be enabled while a fault is latched.
    #[error("Motion control is faulted: {0}")]
    Faulted(FaultCode),

    /// The strategy does not close a position loop.
    #[error("{0:?} is not a position control strategy")]
    NotPositionStrategy(ControlStrategy),

    /// Auto-tuning only starts from the disabled state.
    #[error("Auto-tuning requires disabled control")]
    NotDisabled,
}

/// Result type for motion control requests.
pub type MotionResult<T> = Result<T, MotionError>;

impl From<MotionError> for ServoError {
    fn from(e: MotionError) -> Self {
        match e {
            MotionError::Rt(e) => ServoError::RT(e),
            MotionError::Config(e) => ServoError::Config(e),
            MotionError::Motorcontrol(e) => e.into(),
            MotionError::Faulted(code) => ServoError::Fault(code),
            other => ServoError::Other(other.to_string()),
        }
    }
}
