//! Periodic task threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use servoloop_errors::FaultCode;
use servoloop_watchdog::FaultLatch;
use tracing::{error, info};

use crate::clock::Clock;
use crate::error::{RTError, RTResult};
use crate::metrics::TimingMetrics;
use crate::scheduler::PeriodicScheduler;

/// Work executed once per period.
pub trait PeriodicTask: Send + 'static {
    /// Run one cycle. `now_us` is the shared clock reading at tick start.
    fn tick(&mut self, now_us: u64);

    /// Called once when the task leaves its loop, for any reason.
    fn on_stop(&mut self) {}
}

/// Timing configuration of a task thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    /// Thread name, also used in log messages.
    pub name: String,
    /// Task period.
    pub period: Duration,
    /// Lateness beyond which a tick counts as a missed deadline.
    pub overrun_tolerance: Duration,
}

impl TaskConfig {
    /// Create a configuration whose overrun tolerance equals the period.
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            overrun_tolerance: period,
        }
    }

    /// Override the overrun tolerance.
    #[must_use]
    pub fn with_overrun_tolerance(mut self, tolerance: Duration) -> Self {
        self.overrun_tolerance = tolerance;
        self
    }
}

/// Cooperative shutdown flag shared by all tasks of a drive.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every task sharing this signal to stop after its current tick.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// `true` once [`ShutdownSignal::trigger`] was called.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Outcome of a task thread that stopped on request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskExit {
    /// Number of completed ticks.
    pub ticks: u64,
    /// Timing statistics of the run.
    pub metrics: TimingMetrics,
}

/// Handle to a running task thread.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    thread: JoinHandle<RTResult<TaskExit>>,
}

impl TaskHandle {
    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once the thread has left its loop.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the thread to finish.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::DeadlineMissed`] if the task overran its period, or
    /// [`RTError::ChannelClosed`] if the task thread panicked.
    pub fn join(self) -> RTResult<TaskExit> {
        self.thread.join().map_err(|_panic| RTError::ChannelClosed)?
    }
}

/// Spawns [`PeriodicTask`]s on dedicated threads.
#[derive(Debug)]
pub struct TaskRunner;

impl TaskRunner {
    /// Run `task` every `config.period` until `shutdown` is triggered.
    ///
    /// On a missed deadline the runner latches [`FaultCode::DeadlineMissed`]
    /// in `latch`, calls [`PeriodicTask::on_stop`] and ends the thread with
    /// [`RTError::DeadlineMissed`].
    ///
    /// # Errors
    ///
    /// Returns [`RTError::ThreadSpawn`] if the OS refuses to create the thread.
    pub fn spawn<T, C>(
        mut task: T,
        config: TaskConfig,
        clock: C,
        shutdown: ShutdownSignal,
        latch: FaultLatch,
    ) -> RTResult<TaskHandle>
    where
        T: PeriodicTask,
        C: Clock + 'static,
    {
        let name = config.name.clone();
        let thread = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                let mut scheduler =
                    PeriodicScheduler::with_tolerance(config.period, config.overrun_tolerance);
                info!(
                    task = %config.name,
                    period_us = config.period.as_micros(),
                    "Task started"
                );
                scheduler.reset();
                let result = loop {
                    if shutdown.is_triggered() {
                        break Ok(TaskExit {
                            ticks: scheduler.tick_count(),
                            metrics: *scheduler.metrics(),
                        });
                    }
                    if let Err(e) = scheduler.wait_for_tick() {
                        latch.latch(FaultCode::DeadlineMissed);
                        error!(
                            task = %config.name,
                            tick = scheduler.tick_count(),
                            "Deadline missed, task stopped"
                        );
                        break Err(e);
                    }
                    task.tick(clock.now_us());
                };
                task.on_stop();
                info!(task = %config.name, "Task stopped");
                result
            })
            .map_err(|_io| RTError::ThreadSpawn)?;
        Ok(TaskHandle { name, thread })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use std::sync::atomic::AtomicU64;

    struct Counter {
        ticks: Arc<AtomicU64>,
        stopped: Arc<AtomicBool>,
        work: Duration,
    }

    impl PeriodicTask for Counter {
        fn tick(&mut self, _now_us: u64) {
            self.ticks.fetch_add(1, Ordering::Relaxed);
            if !self.work.is_zero() {
                thread::sleep(self.work);
            }
        }

        fn on_stop(&mut self) {
            self.stopped.store(true, Ordering::Release);
        }
    }

    fn counter(work: Duration) -> (Counter, Arc<AtomicU64>, Arc<AtomicBool>) {
        let ticks = Arc::new(AtomicU64::new(0));
        let stopped = Arc::new(AtomicBool::new(false));
        let task = Counter {
            ticks: ticks.clone(),
            stopped: stopped.clone(),
            work,
        };
        (task, ticks, stopped)
    }

    #[test]
    fn test_task_runs_until_shutdown() -> RTResult<()> {
        let (task, ticks, stopped) = counter(Duration::ZERO);
        let shutdown = ShutdownSignal::new();
        let latch = FaultLatch::new();
        let config = TaskConfig::new("counter", Duration::from_millis(1))
            .with_overrun_tolerance(Duration::from_secs(1));
        let handle = TaskRunner::spawn(
            task,
            config,
            MonotonicClock::new(),
            shutdown.clone(),
            latch.clone(),
        )?;
        assert_eq!(handle.name(), "counter");

        thread::sleep(Duration::from_millis(30));
        shutdown.trigger();
        let exit = handle.join()?;

        assert!(exit.ticks > 0);
        assert_eq!(exit.ticks, ticks.load(Ordering::Relaxed));
        assert!(stopped.load(Ordering::Acquire));
        assert!(!latch.is_faulted());
        Ok(())
    }

    #[test]
    fn test_overrunning_task_latches_deadline_fault() -> RTResult<()> {
        let (task, _ticks, stopped) = counter(Duration::from_millis(20));
        let latch = FaultLatch::new();
        let config = TaskConfig::new("overrun", Duration::from_millis(1));
        let handle = TaskRunner::spawn(
            task,
            config,
            MonotonicClock::new(),
            ShutdownSignal::new(),
            latch.clone(),
        )?;

        assert_eq!(handle.join().err(), Some(RTError::DeadlineMissed));
        assert_eq!(latch.current(), FaultCode::DeadlineMissed);
        assert!(stopped.load(Ordering::Acquire));
        Ok(())
    }
}
