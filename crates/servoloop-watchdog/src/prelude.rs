//! Convenient re-exports for fault supervision.

pub use crate::config::{ProtectionLimits, WatchdogConfig};
pub use crate::error::{WatchdogError, WatchdogResult};
pub use crate::latch::FaultLatch;
pub use crate::monitor::SensorMonitor;
pub use crate::state::{WatchdogMetrics, WatchdogStatus};
pub use crate::watchdog::{PowerMeasurements, Watchdog};
pub use servoloop_errors::FaultCode;
