//! Prelude for the controllers crate.
//!
//! ```
//! use servoloop_controllers::prelude::*;
//!
//! let mut pid = PidController::new(PidConfig::default());
//! pid.reset();
//! ```

pub use crate::autotune::{AutoTuneConfig, AutoTuneStep, TuningResult, VelocityAutoTuner};
pub use crate::nonlinear::{NonlinearConfig, NonlinearPositionController};
pub use crate::pid::{PidConfig, PidController, PidGains};
pub use crate::position_profile::{PositionProfile, PositionProfileLimits, PositionProfiler};
pub use crate::ramp::{TorqueRamp, VelocityRamp, VelocityRampConfig};
pub use servoloop_errors::TuningError;
