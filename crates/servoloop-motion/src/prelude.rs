//! Convenient re-exports for motion control users.

pub use crate::actuator::TorqueActuator;
pub use crate::config::{ControlStrategy, MotionControlConfig};
pub use crate::control_data::{DownstreamControlData, UpstreamControlData};
pub use crate::coordinator::{MotionControlCoordinator, MotionFeedback, MotionState, MotorCommand};
pub use crate::error::{MotionError, MotionResult};
pub use crate::service::{MotionControlClient, MotionControlService};
