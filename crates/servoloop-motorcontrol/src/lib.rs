//! Commutation and torque control for the servoloop drive.
//!
//! The motorcontrol task runs at the commutation period. It reads the
//! electrical angle from the position feedback cache, estimates torque from
//! the measured phase currents, closes the torque loop and drives the power
//! stage through sine modulation with dead time.
//!
//! # Safety
//!
//! The output is forced off while any of these hold:
//!
//! - a fault is latched in the shared [`servoloop_watchdog::FaultLatch`]
//! - safe torque off was requested
//! - the FET drivers are disabled
//!
//! Every tick feeds the watchdog heartbeat and checks the power stage
//! measurements against the protection limits before commutating, so a
//! protection fault turns the output off in the period it is detected.
//! Commands received before a fault are dropped; new commands take effect
//! once `reset_faults` has cleared the latch.
//!
//! # Example
//!
//! ```
//! use servoloop_motorcontrol::{Commutation, MotorcontrolConfig};
//! use servoloop_watchdog::PowerMeasurements;
//!
//! let mut commutation = Commutation::new(MotorcontrolConfig::default());
//! commutation.set_fets_state(true);
//! commutation.set_voltage(1_000.0);
//! let output = commutation.step(0, &PowerMeasurements::default(), false);
//! assert!(output.enabled);
//!
//! let output = commutation.step(0, &PowerMeasurements::default(), true);
//! assert!(output.is_off());
//! ```

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod commutation;
pub mod config;
pub mod control_data;
pub mod error;
pub mod foc;
pub mod power;
pub mod prelude;
pub mod service;

pub use commutation::{CommandMode, Commutation};
pub use config::{MotorType, MotorcontrolConfig, MotorcontrolConfigBuilder, WindingType};
pub use control_data::UpstreamControlData;
pub use error::{MotorcontrolError, MotorcontrolResult};
pub use foc::{PwmOutput, VOLTAGE_FULL_SCALE, modulate};
pub use power::PowerStage;
pub use service::{MotorcontrolClient, MotorcontrolRequest, MotorcontrolService};
