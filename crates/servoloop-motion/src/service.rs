//! Motion control task and its request interface.

use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use servoloop_controllers::{AutoTuneConfig, TuningError, TuningResult};
use servoloop_errors::{ConfigError, FaultCode};
use servoloop_feedback::FeedbackReader;
use servoloop_motorcontrol::MotorcontrolError;
use servoloop_rt::{PeriodicTask, ServiceClient, request_channel, respond};
use servoloop_watchdog::FaultLatch;
use tracing::{debug, error, info, warn};

use crate::actuator::TorqueActuator;
use crate::config::{ControlStrategy, MotionControlConfig};
use crate::control_data::{DownstreamControlData, UpstreamControlData};
use crate::coordinator::{MotionControlCoordinator, MotionFeedback, MotionState, MotorCommand};
use crate::error::MotionResult;

/// Requests served by [`MotionControlService`].
#[derive(Debug)]
pub enum MotionControlRequest {
    /// Enter position control with a strategy.
    EnablePositionCtrl {
        strategy: ControlStrategy,
        response: Sender<MotionResult<()>>,
    },
    /// Enter velocity control.
    EnableVelocityCtrl { response: Sender<MotionResult<()>> },
    /// Enter torque control.
    EnableTorqueCtrl { response: Sender<MotionResult<()>> },
    /// Stop commanding torque.
    Disable { response: Sender<()> },
    /// Torque setpoint for torque control, mNm.
    SetTorque { torque: f64, response: Sender<()> },
    /// Exchange setpoints for a measurement snapshot.
    UpdateControlData {
        downstream: DownstreamControlData,
        response: Sender<MotionResult<UpstreamControlData>>,
    },
    /// Active configuration.
    GetConfig {
        response: Sender<MotionControlConfig>,
    },
    /// Replace the configuration.
    SetConfig {
        config: MotionControlConfig,
        response: Sender<Result<(), ConfigError>>,
    },
    /// Moment of inertia for the nonlinear controller.
    SetJ { j: f64, response: Sender<()> },
    /// Engage or release the brake.
    SetBrakeStatus {
        engaged: bool,
        response: Sender<MotionResult<()>>,
    },
    /// Clear the motorcontrol fault and leave the faulted state.
    ResetMotorcontrolFaults {
        response: Sender<MotionResult<FaultCode>>,
    },
    /// Position in ticks.
    GetPosition { response: Sender<i32> },
    /// Velocity in rpm.
    GetVelocity { response: Sender<i32> },
    /// Coordinator state.
    GetState { response: Sender<MotionState> },
    /// Start velocity loop identification.
    StartAutoTune {
        config: AutoTuneConfig,
        response: Sender<MotionResult<()>>,
    },
    /// Outcome of the last identification.
    GetTuningResult {
        response: Sender<Option<Result<TuningResult, TuningError>>>,
    },
}

/// Periodic motion control task.
///
/// Every tick serves pending requests, samples the feedback cache and the
/// fault latch, runs the coordinator and forwards its command to
/// motorcontrol. A failed motorcontrol request latches
/// [`FaultCode::DeadlineMissed`], which takes both loops to their safe state.
pub struct MotionControlService<A> {
    coordinator: MotionControlCoordinator,
    motorcontrol: A,
    reader: FeedbackReader,
    latch: FaultLatch,
    requests: Receiver<MotionControlRequest>,
    torque_control: bool,
    brake: Option<bool>,
    last_command: MotorCommand,
}

impl<A: TorqueActuator> MotionControlService<A> {
    /// Create the service and its client.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(
        config: MotionControlConfig,
        motorcontrol: A,
        reader: FeedbackReader,
        latch: FaultLatch,
    ) -> Result<(Self, MotionControlClient), ConfigError> {
        config.validate()?;
        let (tx, requests) = request_channel();
        let service = Self {
            coordinator: MotionControlCoordinator::new(config),
            motorcontrol,
            reader,
            latch,
            requests,
            torque_control: false,
            brake: None,
            last_command: MotorCommand::default(),
        };
        Ok((service, MotionControlClient::new(tx)))
    }

    /// Coordinator state, for inspection.
    pub fn coordinator(&self) -> &MotionControlCoordinator {
        &self.coordinator
    }

    /// Command sent in the last tick.
    pub fn last_command(&self) -> &MotorCommand {
        &self.last_command
    }

    /// Motorcontrol interface, for inspection.
    pub fn motorcontrol(&self) -> &A {
        &self.motorcontrol
    }

    fn link_failed(&self, operation: &'static str, e: &MotorcontrolError) {
        error!(operation, error = %e, "Motorcontrol request failed");
        if self.latch.latch(FaultCode::DeadlineMissed) {
            warn!("Motorcontrol unreachable, fault latched");
        }
    }

    fn apply(&mut self, command: MotorCommand) {
        let toggled = command.torque_control != self.torque_control;
        // The setpoint goes first so the loop never starts on a stale command;
        // a disabled command carries zero torque.
        if command.torque_control || toggled {
            if let Err(e) = self.motorcontrol.set_torque(command.torque) {
                self.link_failed("set_torque", &e);
            }
        }
        if toggled {
            match self.motorcontrol.set_torque_control_enabled(command.torque_control) {
                Ok(()) => self.torque_control = command.torque_control,
                Err(e) => self.link_failed("set_torque_control_enabled", &e),
            }
        }
        if self.brake != Some(command.brake) {
            match self.motorcontrol.set_brake_status(command.brake) {
                Ok(()) => self.brake = Some(command.brake),
                Err(e) => self.link_failed("set_brake_status", &e),
            }
        }
        self.last_command = command;
    }

    fn handle(&mut self, request: MotionControlRequest) {
        match request {
            MotionControlRequest::EnablePositionCtrl { strategy, response } => {
                respond(&response, self.coordinator.enable_position(strategy));
            }
            MotionControlRequest::EnableVelocityCtrl { response } => {
                respond(&response, self.coordinator.enable_velocity());
            }
            MotionControlRequest::EnableTorqueCtrl { response } => {
                respond(&response, self.coordinator.enable_torque());
            }
            MotionControlRequest::Disable { response } => {
                self.coordinator.disable();
                respond(&response, ());
            }
            MotionControlRequest::SetTorque { torque, response } => {
                self.coordinator.set_torque(torque);
                respond(&response, ());
            }
            MotionControlRequest::UpdateControlData { downstream, response } => {
                self.coordinator.set_downstream(downstream);
                let upstream = self
                    .motorcontrol
                    .update_upstream_control_data()
                    .map(|upstream| self.coordinator.to_user_frame(upstream))
                    .map_err(Into::into);
                respond(&response, upstream);
            }
            MotionControlRequest::GetConfig { response } => {
                respond(&response, self.coordinator.config().clone());
            }
            MotionControlRequest::SetConfig { config, response } => {
                let result = config.validate();
                match &result {
                    Ok(()) => {
                        info!(strategy = ?config.strategy, "Motion control configuration updated");
                        self.coordinator.set_config(config);
                    }
                    Err(e) => debug!(error = %e, "Motion control configuration rejected"),
                }
                respond(&response, result);
            }
            MotionControlRequest::SetJ { j, response } => {
                self.coordinator.set_j(j);
                respond(&response, ());
            }
            MotionControlRequest::SetBrakeStatus { engaged, response } => {
                let result = self.motorcontrol.set_brake_status(engaged);
                if result.is_ok() {
                    self.brake = Some(engaged);
                }
                respond(&response, result.map_err(Into::into));
            }
            MotionControlRequest::ResetMotorcontrolFaults { response } => {
                let result = self.motorcontrol.reset_faults();
                if result.is_ok() {
                    self.coordinator.clear_fault();
                }
                respond(&response, result.map_err(Into::into));
            }
            MotionControlRequest::GetPosition { response } => {
                respond(&response, self.coordinator.position());
            }
            MotionControlRequest::GetVelocity { response } => {
                respond(&response, self.coordinator.velocity());
            }
            MotionControlRequest::GetState { response } => {
                respond(&response, self.coordinator.state());
            }
            MotionControlRequest::StartAutoTune { config, response } => {
                respond(&response, self.coordinator.start_autotune(config));
            }
            MotionControlRequest::GetTuningResult { response } => {
                respond(&response, self.coordinator.tuning_result().cloned());
            }
        }
    }
}

impl<A: TorqueActuator> PeriodicTask for MotionControlService<A> {
    fn tick(&mut self, _now_us: u64) {
        while let Ok(request) = self.requests.try_recv() {
            self.handle(request);
        }

        let reading = self.reader.latest();
        let feedback = MotionFeedback {
            position: reading.count,
            velocity: reading.velocity,
            fault: self.latch.current(),
        };
        let command = self.coordinator.step(&feedback);
        self.apply(command);
    }

    fn on_stop(&mut self) {
        self.coordinator.disable();
        if let Err(e) = self.motorcontrol.set_torque_control_enabled(false) {
            warn!(error = %e, "Could not stop the torque loop");
        }
        if let Err(e) = self.motorcontrol.set_torque(0.0) {
            warn!(error = %e, "Could not zero the torque setpoint");
        }
        info!("Motion control service stopped");
    }
}

/// Request interface of a [`MotionControlService`].
#[derive(Debug, Clone)]
pub struct MotionControlClient {
    inner: ServiceClient<MotionControlRequest>,
}

impl MotionControlClient {
    fn new(requests: Sender<MotionControlRequest>) -> Self {
        Self {
            inner: ServiceClient::new(requests),
        }
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            inner: self.inner.with_timeout(timeout),
        }
    }

    /// Enter position control, holding the current position.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer, a fault is latched,
    /// or `strategy` is not a position strategy.
    pub fn enable_position_control(&self, strategy: ControlStrategy) -> MotionResult<()> {
        self.inner
            .call(|response| MotionControlRequest::EnablePositionCtrl { strategy, response })?
    }

    /// Enter velocity control.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer or a fault is latched.
    pub fn enable_velocity_control(&self) -> MotionResult<()> {
        self.inner
            .call(|response| MotionControlRequest::EnableVelocityCtrl { response })?
    }

    /// Enter torque control.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer or a fault is latched.
    pub fn enable_torque_control(&self) -> MotionResult<()> {
        self.inner
            .call(|response| MotionControlRequest::EnableTorqueCtrl { response })?
    }

    /// Stop commanding torque.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn disable(&self) -> MotionResult<()> {
        Ok(self
            .inner
            .call(|response| MotionControlRequest::Disable { response })?)
    }

    /// Set the torque used in torque control, mNm.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_torque(&self, torque: f64) -> MotionResult<()> {
        Ok(self
            .inner
            .call(|response| MotionControlRequest::SetTorque { torque, response })?)
    }

    /// Send setpoints and receive a measurement snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if either service does not answer.
    pub fn update_control_data(&self, downstream: DownstreamControlData) -> MotionResult<UpstreamControlData> {
        self.inner
            .call(|response| MotionControlRequest::UpdateControlData { downstream, response })?
    }

    /// Active configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_config(&self) -> MotionResult<MotionControlConfig> {
        Ok(self
            .inner
            .call(|response| MotionControlRequest::GetConfig { response })?)
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer or `config` is
    /// invalid; the previous configuration then stays active.
    pub fn set_config(&self, config: MotionControlConfig) -> MotionResult<()> {
        Ok(self
            .inner
            .call(|response| MotionControlRequest::SetConfig { config, response })??)
    }

    /// Set the moment of inertia used by the nonlinear controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_j(&self, j: f64) -> MotionResult<()> {
        Ok(self
            .inner
            .call(|response| MotionControlRequest::SetJ { j, response })?)
    }

    /// Engage or release the brake.
    ///
    /// # Errors
    ///
    /// Returns an error if either service does not answer.
    pub fn set_brake_status(&self, engaged: bool) -> MotionResult<()> {
        self.inner
            .call(|response| MotionControlRequest::SetBrakeStatus { engaged, response })?
    }

    /// Clear the latched fault; returns the cleared fault.
    ///
    /// # Errors
    ///
    /// Returns an error if either service does not answer.
    pub fn reset_motorcontrol_faults(&self) -> MotionResult<FaultCode> {
        self.inner
            .call(|response| MotionControlRequest::ResetMotorcontrolFaults { response })?
    }

    /// Position in ticks.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_position(&self) -> MotionResult<i32> {
        Ok(self
            .inner
            .call(|response| MotionControlRequest::GetPosition { response })?)
    }

    /// Velocity in rpm.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_velocity(&self) -> MotionResult<i32> {
        Ok(self
            .inner
            .call(|response| MotionControlRequest::GetVelocity { response })?)
    }

    /// Coordinator state.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_state(&self) -> MotionResult<MotionState> {
        Ok(self
            .inner
            .call(|response| MotionControlRequest::GetState { response })?)
    }

    /// Start velocity loop identification.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer, control is enabled,
    /// or `config` is invalid.
    pub fn start_autotune(&self, config: AutoTuneConfig) -> MotionResult<()> {
        self.inner
            .call(|response| MotionControlRequest::StartAutoTune { config, response })?
    }

    /// Outcome of the last identification, `None` while running or never run.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_tuning_result(&self) -> MotionResult<Option<Result<TuningResult, TuningError>>> {
        Ok(self
            .inner
            .call(|response| MotionControlRequest::GetTuningResult { response })?)
    }
}
