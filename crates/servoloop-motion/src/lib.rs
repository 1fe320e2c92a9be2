//! Motion control for the servoloop drive.
//!
//! Closes the position and velocity loops on top of motorcontrol's torque
//! loop. A [`MotionControlCoordinator`] owns the controllers and the
//! operating state; [`MotionControlService`] runs it once per control period
//! and forwards torque, torque loop enable and brake commands through a
//! [`TorqueActuator`], normally a
//! [`MotorcontrolClient`](servoloop_motorcontrol::MotorcontrolClient).
//!
//! # Control strategies
//!
//! | Code | Strategy | Loop |
//! |------|----------|------|
//! | 101 | [`ControlStrategy::PositionPid`] | position PID to torque |
//! | 102 | [`ControlStrategy::PositionPidVelocityCascaded`] | position PID to velocity PID to torque |
//! | 103 | [`ControlStrategy::NonlinearPosition`] | nonlinear position controller to torque |
//! | 201 | [`ControlStrategy::VelocityPid`] | velocity PID to torque |
//!
//! # Safety
//!
//! A latched fault moves the coordinator to
//! [`MotionState::Faulted`] from any state and stops the torque loop. It
//! stays there until the fault is reset; enabling control while faulted is
//! rejected.
//!
//! # Example
//!
//! ```
//! use servoloop_errors::FaultCode;
//! use servoloop_motion::{MotionControlConfig, MotionControlCoordinator, MotionFeedback, MotionState};
//!
//! let mut coordinator = MotionControlCoordinator::new(MotionControlConfig::default());
//! coordinator.enable_torque()?;
//! coordinator.set_torque(50.0);
//! let command = coordinator.step(&MotionFeedback::default());
//! assert!(command.torque_control);
//!
//! let faulted = MotionFeedback { fault: FaultCode::OverVoltage, ..MotionFeedback::default() };
//! let command = coordinator.step(&faulted);
//! assert!(!command.torque_control);
//! assert_eq!(coordinator.state(), MotionState::Faulted(FaultCode::OverVoltage));
//! # Ok::<(), servoloop_motion::MotionError>(())
//! ```

#![deny(static_mut_refs)]
#![deny(clippy::unwrap_used)]

pub mod actuator;
pub mod config;
pub mod control_data;
pub mod coordinator;
pub mod error;
pub mod prelude;
pub mod service;

pub use actuator::TorqueActuator;
pub use config::{BrakeConfig, ControlStrategy, MotionControlConfig, MotionControlConfigBuilder, ProfilerConfig};
pub use control_data::{DownstreamControlData, UpstreamControlData};
pub use coordinator::{MotionControlCoordinator, MotionFeedback, MotionState, MotorCommand};
pub use error::{MotionError, MotionResult};
pub use service::{MotionControlClient, MotionControlRequest, MotionControlService};
