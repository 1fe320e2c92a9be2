//! Convenient re-exports for motorcontrol users.

pub use crate::commutation::Commutation;
pub use crate::config::{MotorType, MotorcontrolConfig, WindingType};
pub use crate::control_data::UpstreamControlData;
pub use crate::error::{MotorcontrolError, MotorcontrolResult};
pub use crate::foc::PwmOutput;
pub use crate::power::PowerStage;
pub use crate::service::{MotorcontrolClient, MotorcontrolService};
