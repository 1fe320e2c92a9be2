//! Position feedback client errors.

use servoloop_errors::{ConfigError, RTError, ServoError};
use thiserror::Error;

/// Errors returned by [`crate::PositionFeedbackClient`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedbackError {
    /// The service did not answer.
    #[error("Position feedback service error: {0}")]
    Rt(#[from] RTError),

    /// A new configuration was rejected; the previous one stays active.
    #[error("Invalid position feedback configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for position feedback requests.
pub type FeedbackResult<T> = Result<T, FeedbackError>;

impl From<FeedbackError> for ServoError {
    fn from(e: FeedbackError) -> Self {
        match e {
            FeedbackError::Rt(e) => ServoError::RT(e),
            FeedbackError::Config(e) => ServoError::Config(e),
        }
    }
}
