//! Periodic task runtime for the servoloop drive.
//!
//! Every component of the drive runs as an independent periodic task with a
//! fixed period: tens of microseconds for sensor polling and commutation,
//! about a millisecond for motion control. This crate provides:
//!
//! - **PeriodicScheduler**: absolute wake times (no drift accumulation) and
//!   detection of overruns
//! - **TaskRunner**: runs a [`PeriodicTask`] on a named thread until shutdown
//! - **Clock**: microsecond timestamps shared by all tasks
//! - **TimingMetrics**: lateness statistics
//! - **rpc**: bounded request/response channels between tasks and callers
//!
//! # Deadline Policy
//!
//! A task that does not finish within its period is a fatal
//! programming/configuration error. There is no catch-up and no queuing of
//! missed cycles: the runner latches
//! [`FaultCode::DeadlineMissed`](servoloop_errors::FaultCode::DeadlineMissed),
//! stops the task and reports [`RTError::DeadlineMissed`] from
//! [`TaskHandle::join`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use servoloop_rt::prelude::*;
//!
//! let mut scheduler = PeriodicScheduler::new(Duration::from_millis(1));
//! loop {
//!     let tick = scheduler.wait_for_tick()?;
//!     // Process one control cycle
//!     # if tick > 3 { break; }
//! }
//! # Ok::<(), RTError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]

pub mod clock;
pub mod error;
pub mod metrics;
pub mod prelude;
pub mod rpc;
pub mod scheduler;
pub mod task;

pub use clock::{Clock, MonotonicClock};
pub use error::{RTError, RTResult};
pub use metrics::TimingMetrics;
pub use rpc::{ServiceClient, request_channel, respond};
pub use scheduler::PeriodicScheduler;
pub use task::{PeriodicTask, ShutdownSignal, TaskConfig, TaskExit, TaskHandle, TaskRunner};

/// Motion control period (1 ms).
pub const MOTION_CONTROL_PERIOD_US: u32 = 1_000;

/// Default sensor polling and commutation period (100 µs).
pub const FAST_LOOP_PERIOD_US: u32 = 100;
