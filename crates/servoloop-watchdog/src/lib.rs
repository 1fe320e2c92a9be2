//! # servoloop-watchdog
//!
//! Fault supervision for the servoloop drive.
//!
//! This crate provides:
//! - [`FaultLatch`]: a lock-free, shared, latched [`FaultCode`] cell that every
//!   output stage checks before driving the power stage
//! - [`Watchdog`]: heartbeat supervision plus phase-current and DC-bus
//!   protection limits, with `start`/`stop`/`protect`/`reset_faults`
//! - [`SensorMonitor`]: escalates a sensor that stays unavailable for too many
//!   consecutive cycles into [`FaultCode::SensorUnavailable`]
//!
//! ## Safety Guarantees
//!
//! - **First fault wins**: a latched fault is never overwritten by a later one
//! - **Latched until cleared**: only [`Watchdog::reset_faults`] clears the latch
//! - **No blocking operations**: all state lives in atomics
//!
//! ## State Machine
//!
//! ```text
//! ┌─────────┐   start()   ┌─────────┐
//! │ Stopped │────────────►│ Running │
//! └─────────┘◄────────────└─────────┘
//!      ▲         stop()        │
//!      │                       │ protect() / heartbeat timeout
//!      │ reset_faults()        ▼
//!      │ (if stopped)    ┌─────────┐
//!      └─────────────────│ Tripped │──reset_faults()──► Running
//!                        └─────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use servoloop_watchdog::prelude::*;
//!
//! let watchdog = Watchdog::new(WatchdogConfig::default());
//! watchdog.start(0)?;
//! watchdog.heartbeat(100);
//! assert!(!watchdog.latch().is_faulted());
//!
//! watchdog.protect(FaultCode::OverCurrentPhaseA);
//! assert_eq!(watchdog.latch().current(), FaultCode::OverCurrentPhaseA);
//!
//! assert_eq!(watchdog.reset_faults(), FaultCode::OverCurrentPhaseA);
//! assert!(!watchdog.latch().is_faulted());
//! # Ok::<(), WatchdogError>(())
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_debug_implementations
)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod latch;
pub mod monitor;
pub mod prelude;
pub mod state;
pub mod watchdog;

pub use config::{ProtectionLimits, WatchdogConfig};
pub use error::{WatchdogError, WatchdogResult};
pub use latch::FaultLatch;
pub use monitor::SensorMonitor;
pub use servoloop_errors::FaultCode;
pub use state::{WatchdogMetrics, WatchdogState, WatchdogStatus};
pub use watchdog::{PowerMeasurements, Watchdog};
