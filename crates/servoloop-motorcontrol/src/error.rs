//! Motorcontrol client errors.

use servoloop_errors::{ConfigError, RTError, ServoError};
use thiserror::Error;

/// Errors returned by [`crate::MotorcontrolClient`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotorcontrolError {
    /// The service did not answer.
    #[error("Motorcontrol service error: {0}")]
    Rt(#[from] RTError),

    /// A new configuration was rejected; the previous one stays active.
    #[error("Invalid motorcontrol configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for motorcontrol requests.
pub type MotorcontrolResult<T> = Result<T, MotorcontrolError>;

impl From<MotorcontrolError> for ServoError {
    fn from(e: MotorcontrolError) -> Self {
        match e {
            MotorcontrolError::Rt(e) => ServoError::RT(e),
            MotorcontrolError::Config(e) => ServoError::Config(e),
        }
    }
}
