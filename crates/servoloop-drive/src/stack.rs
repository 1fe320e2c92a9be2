//! Drive stack: one thread per loop, wired through the feedback cache and
//! the fault latch.
//!
//! ```text
//!   SensorPort ──► feedback ──► cache ──► motorcontrol ──► PowerStage
//!                                 │            ▲
//!                                 └──► motion ─┘ (torque, enable, brake)
//!
//!   supervisor: watchdog.poll()          fault latch shared by all tasks
//! ```

use std::sync::Arc;
use std::time::Duration;

use servoloop_errors::FaultCode;
use servoloop_feedback::{
    FeedbackReader, PositionFeedbackClient, PositionFeedbackService, SensorPort,
    position_feedback_cache,
};
use servoloop_motion::{MotionControlClient, MotionControlService};
use servoloop_motorcontrol::{MotorcontrolClient, MotorcontrolService, PowerStage};
use servoloop_rt::{
    Clock, MonotonicClock, PeriodicTask, RTResult, ShutdownSignal, TaskConfig, TaskExit, TaskHandle,
    TaskRunner,
};
use servoloop_watchdog::Watchdog;
use tracing::{debug, error, info, warn};

use crate::config::{DriveConfig, TaskPeriods};
use crate::error::DriveResult;

/// Periodic task checking the commutation heartbeat.
pub struct WatchdogSupervisor {
    watchdog: Arc<Watchdog>,
    last_fault: FaultCode,
}

impl WatchdogSupervisor {
    /// Supervise `watchdog`.
    pub fn new(watchdog: Arc<Watchdog>) -> Self {
        Self {
            watchdog,
            last_fault: FaultCode::NoFault,
        }
    }
}

impl PeriodicTask for WatchdogSupervisor {
    fn tick(&mut self, now_us: u64) {
        let fault = self.watchdog.poll(now_us);
        if fault != self.last_fault {
            if fault.is_fault() {
                error!(fault = %fault, severity = %fault.severity(), "Drive faulted");
            } else {
                info!(cleared = %self.last_fault, "Drive fault cleared");
            }
            self.last_fault = fault;
        }
    }
}

/// How one task ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Task name.
    pub name: String,
    /// Exit statistics, or why the task stopped on its own.
    pub result: RTResult<TaskExit>,
}

/// Outcome of [`DriveHandle::shutdown`], in stop order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriveExit {
    /// One entry per task.
    pub tasks: Vec<TaskOutcome>,
}

impl DriveExit {
    /// `true` if every task ran until shutdown.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.tasks.iter().all(|task| task.result.is_ok())
    }

    /// Outcome of the task called `name`.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

/// Starts drives.
#[derive(Debug)]
pub struct DriveStack;

impl DriveStack {
    /// Validate `config`, start the watchdog and spawn the feedback,
    /// motorcontrol, supervisor and motion control tasks. The gate drivers
    /// are enabled once commutation runs; motion control starts disabled.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, a task that cannot be
    /// spawned, or a gate driver enable that is not answered. Tasks already
    /// started are stopped.
    pub fn spawn<P, S>(config: DriveConfig, port: P, power: S) -> DriveResult<DriveHandle>
    where
        P: SensorPort + 'static,
        S: PowerStage + 'static,
    {
        config.validate()?;
        let DriveConfig {
            feedback: feedback_config,
            motorcontrol: motorcontrol_config,
            motion: motion_config,
            watchdog: watchdog_config,
            periods,
        } = config;

        let watchdog = Arc::new(Watchdog::new(watchdog_config));
        let latch = watchdog.latch().clone();
        let (publisher, reader) = position_feedback_cache();

        let sensor = feedback_config.sensor_type;
        let strategy = motion_config.strategy;
        let (feedback_service, feedback) = PositionFeedbackService::new(
            feedback_config,
            port,
            publisher,
            latch.clone(),
            watchdog_config.sensor_timeout_cycles,
        )?;
        let (motorcontrol_service, motorcontrol) =
            MotorcontrolService::new(motorcontrol_config, power, reader.clone(), watchdog.clone())?;
        let (motion_service, motion) =
            MotionControlService::new(motion_config, motorcontrol.clone(), reader.clone(), latch.clone())?;

        let mut handle = DriveHandle {
            feedback,
            motorcontrol,
            motion,
            reader,
            watchdog: watchdog.clone(),
            control_shutdown: ShutdownSignal::new(),
            shutdown: ShutdownSignal::new(),
            motion_task: None,
            tasks: Vec::new(),
        };

        let clock = MonotonicClock::new();
        watchdog.start(clock.now_us())?;

        handle.tasks.push(TaskRunner::spawn(
            feedback_service,
            task_config("feedback", periods.feedback_us, &periods),
            clock.clone(),
            handle.shutdown.clone(),
            latch.clone(),
        )?);
        handle.tasks.push(TaskRunner::spawn(
            motorcontrol_service,
            task_config("motorcontrol", periods.motorcontrol_us, &periods),
            clock.clone(),
            handle.shutdown.clone(),
            latch.clone(),
        )?);
        handle.tasks.push(TaskRunner::spawn(
            WatchdogSupervisor::new(watchdog),
            task_config("supervisor", periods.supervisor_us, &periods),
            clock.clone(),
            handle.shutdown.clone(),
            latch.clone(),
        )?);

        handle.motorcontrol.set_fets_state(true)?;

        handle.motion_task = Some(TaskRunner::spawn(
            motion_service,
            task_config("motion", periods.motion_us, &periods),
            clock,
            handle.control_shutdown.clone(),
            latch,
        )?);

        info!(
            sensor = ?sensor,
            strategy = ?strategy,
            motion_period_us = periods.motion_us,
            "Drive stack started"
        );
        Ok(handle)
    }
}

fn task_config(name: &str, period_us: u32, periods: &TaskPeriods) -> TaskConfig {
    TaskConfig::new(name, Duration::from_micros(u64::from(period_us)))
        .with_overrun_tolerance(periods.overrun_tolerance())
}

/// A running drive.
///
/// Dropping the handle stops every task without waiting for them; use
/// [`DriveHandle::shutdown`] to stop in order and collect the outcomes.
pub struct DriveHandle {
    feedback: PositionFeedbackClient,
    motorcontrol: MotorcontrolClient,
    motion: MotionControlClient,
    reader: FeedbackReader,
    watchdog: Arc<Watchdog>,
    control_shutdown: ShutdownSignal,
    shutdown: ShutdownSignal,
    motion_task: Option<TaskHandle>,
    tasks: Vec<TaskHandle>,
}

impl DriveHandle {
    /// Position feedback requests.
    pub fn feedback(&self) -> &PositionFeedbackClient {
        &self.feedback
    }

    /// Motorcontrol requests.
    pub fn motorcontrol(&self) -> &MotorcontrolClient {
        &self.motorcontrol
    }

    /// Motion control requests.
    pub fn motion(&self) -> &MotionControlClient {
        &self.motion
    }

    /// A reader of the feedback cache.
    pub fn reader(&self) -> FeedbackReader {
        self.reader.clone()
    }

    /// The drive's watchdog.
    pub fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }

    /// Currently latched fault.
    pub fn fault(&self) -> FaultCode {
        self.watchdog.latch().current()
    }

    /// `true` while every task is still running.
    pub fn is_running(&self) -> bool {
        self.motion_task.iter().chain(self.tasks.iter()).all(|task| !task.is_finished())
    }

    /// Stop motion control first so it can release the torque loop, then the
    /// remaining tasks in reverse start order.
    pub fn shutdown(mut self) -> DriveExit {
        let mut exit = DriveExit::default();
        self.control_shutdown.trigger();
        if let Some(task) = self.motion_task.take() {
            exit.tasks.push(join(task));
        }
        self.shutdown.trigger();
        while let Some(task) = self.tasks.pop() {
            exit.tasks.push(join(task));
        }
        if let Err(e) = self.watchdog.stop() {
            debug!(error = %e, "Watchdog not running at shutdown");
        }
        info!(clean = exit.is_clean(), "Drive stack stopped");
        exit
    }
}

fn join(task: TaskHandle) -> TaskOutcome {
    let name = task.name().to_owned();
    let result = task.join();
    if let Err(e) = &result {
        warn!(task = %name, error = %e, "Task ended before shutdown");
    }
    TaskOutcome { name, result }
}

impl Drop for DriveHandle {
    fn drop(&mut self) {
        self.control_shutdown.trigger();
        self.shutdown.trigger();
    }
}
