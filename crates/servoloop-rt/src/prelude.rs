//! Prelude module for common runtime types.

pub use crate::clock::{Clock, MonotonicClock};
pub use crate::error::{RTError, RTResult};
pub use crate::metrics::TimingMetrics;
pub use crate::scheduler::PeriodicScheduler;
pub use crate::task::{PeriodicTask, ShutdownSignal, TaskConfig, TaskExit, TaskHandle, TaskRunner};
