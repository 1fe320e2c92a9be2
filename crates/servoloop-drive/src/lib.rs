//! Complete servoloop drive.
//!
//! [`DriveStack::spawn`] validates a [`DriveConfig`], starts the watchdog and
//! runs every loop on its own periodic thread:
//!
//! | Task | Default period | Role |
//! |------|----------------|------|
//! | `feedback` | 100 µs | decode the sensor, publish to the feedback cache |
//! | `motorcontrol` | 100 µs | protection checks, torque loop, commutation |
//! | `supervisor` | 250 µs | commutation heartbeat supervision |
//! | `motion` | 1 ms | position and velocity loops |
//!
//! The returned [`DriveHandle`] exposes the request clients of the three
//! services. A deadline miss in any task latches
//! [`FaultCode::DeadlineMissed`](servoloop_errors::FaultCode::DeadlineMissed),
//! which turns the power stage off.
//!
//! # Example
//!
//! ```
//! use servoloop_drive::DriveConfig;
//!
//! let config = DriveConfig::from_json_str(r#"{
//!     "motion": { "strategy": "nonlinear_position" },
//!     "watchdog": { "heartbeat_timeout_us": 2000 }
//! }"#)?;
//! assert_eq!(config.motion.strategy.code(), 103);
//! assert_eq!(config.motion.ticks_per_turn, config.feedback.ticks_per_turn());
//! # Ok::<(), servoloop_errors::ConfigError>(())
//! ```

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod stack;

pub use config::{DriveConfig, DriveConfigBuilder, TaskPeriods};
pub use error::{DriveError, DriveResult};
pub use stack::{DriveExit, DriveHandle, DriveStack, TaskOutcome, WatchdogSupervisor};
