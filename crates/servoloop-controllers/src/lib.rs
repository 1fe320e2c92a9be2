//! Control algorithms for the servoloop drive.
//!
//! Pure per-sample arithmetic: every controller and profile owns its state,
//! takes its inputs as arguments and returns the next command. Nothing here
//! allocates on the sample path, logs or blocks, so the motion control task
//! can call it from its periodic tick.
//!
//! # Overview
//!
//! - **PID**: derivative on filtered feedback, clamped integral ([`pid`])
//! - **Nonlinear position**: stopping-distance limited approach speed with an
//!   inner velocity loop ([`nonlinear`])
//! - **Position profile**: linear function with parabolic blends
//!   ([`position_profile`])
//! - **Ramps**: velocity and torque slope limiters ([`ramp`])
//! - **Auto-tuning**: first-order identification of the velocity plant
//!   ([`autotune`])
//!
//! # Example
//!
//! ```
//! use servoloop_controllers::prelude::*;
//!
//! let limits = PositionProfileLimits::default();
//! let mut profiler = PositionProfiler::new(limits, 1_000);
//! profiler.start(1_000.0, 0.0, 100.0, 50.0, 50.0);
//!
//! let mut pid = PidController::new(PidConfig::new(PidGains::new(5.0, 0.0, 0.0), 100.0, 1_000.0, 1_000));
//! let mut position = 0.0;
//! while let Some(setpoint) = profiler.next_setpoint() {
//!     let _velocity = pid.update(setpoint, position);
//!     position = setpoint;
//!     if profiler.is_done() {
//!         break;
//!     }
//! }
//! assert!((position - 1_000.0).abs() < 1e-6);
//! ```

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod autotune;
pub mod nonlinear;
pub mod pid;
pub mod position_profile;
pub mod prelude;
pub mod ramp;

pub use autotune::{AutoTuneConfig, AutoTuneStep, MAX_TUNING_SAMPLES, TuningResult, VelocityAutoTuner, identify};
pub use nonlinear::{NonlinearConfig, NonlinearPositionController, NonlinearState};
pub use pid::{PID_DENOMINATOR, PidConfig, PidController, PidGains, PidState, saturate};
pub use position_profile::{
    PositionProfile, PositionProfileLimits, PositionProfiler, rpm_to_ticks,
};
pub use ramp::{TorqueRamp, VelocityRamp, VelocityRampConfig};
pub use servoloop_errors::TuningError;
