//! Motorcontrol task and its request interface.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use servoloop_controllers::PidConfig;
use servoloop_errors::{ConfigError, FaultCode};
use servoloop_feedback::FeedbackReader;
use servoloop_rt::{PeriodicTask, ServiceClient, request_channel, respond};
use servoloop_watchdog::{PowerMeasurements, Watchdog};
use tracing::{debug, info, warn};

use crate::commutation::Commutation;
use crate::config::MotorcontrolConfig;
use crate::control_data::UpstreamControlData;
use crate::error::MotorcontrolResult;
use crate::foc::PwmOutput;
use crate::power::PowerStage;

/// Requests served by [`MotorcontrolService`].
#[derive(Debug)]
pub enum MotorcontrolRequest {
    /// Open loop q-axis voltage.
    SetVoltage { voltage: f64, response: Sender<()> },
    /// Torque setpoint in mNm.
    SetTorque { torque: f64, response: Sender<()> },
    /// Torque ceiling in mNm; replies with the ceiling in effect.
    SetTorqueMax { torque: f64, response: Sender<f64> },
    /// Measured torque in mNm.
    GetTorqueActual { response: Sender<f64> },
    /// Shaft velocity in rpm.
    GetVelocityActual { response: Sender<i32> },
    /// Multiturn position count.
    GetPositionActual { response: Sender<i32> },
    /// Brake output.
    SetBrakeStatus { engaged: bool, response: Sender<()> },
    /// Gate driver enable.
    SetFetsState { enabled: bool, response: Sender<()> },
    /// Gate driver state.
    GetFetsState { response: Sender<bool> },
    /// Clear the latched fault; replies with the cleared fault.
    ResetFaults { response: Sender<FaultCode> },
    /// Active configuration.
    GetConfig {
        response: Sender<MotorcontrolConfig>,
    },
    /// Replace the configuration.
    SetConfig {
        config: MotorcontrolConfig,
        response: Sender<Result<(), ConfigError>>,
    },
    /// Enter safe torque off.
    SetSafeTorqueOff { response: Sender<()> },
    /// Enable or disable the torque PID.
    SetTorqueControlEnabled { enabled: bool, response: Sender<()> },
    /// Replace the torque PID parameters.
    SetTorquePid {
        pid: PidConfig,
        response: Sender<Result<(), ConfigError>>,
    },
    /// Measurement snapshot.
    UpdateUpstream {
        response: Sender<UpstreamControlData>,
    },
}

/// Periodic commutation task.
///
/// Every tick it serves pending requests, samples the power stage, feeds the
/// watchdog heartbeat and protection limits, then commutates on the latest
/// electrical angle from the feedback cache. The latched fault is checked
/// after the protection limits of the same sample, so a fault forces the
/// output off in the period it is detected.
pub struct MotorcontrolService<S> {
    commutation: Commutation,
    power: S,
    reader: FeedbackReader,
    watchdog: Arc<Watchdog>,
    requests: Receiver<MotorcontrolRequest>,
    measurements: PowerMeasurements,
    last_fault: FaultCode,
    last_output: PwmOutput,
}

impl<S: PowerStage + 'static> MotorcontrolService<S> {
    /// Create the service and its client.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(
        config: MotorcontrolConfig,
        power: S,
        reader: FeedbackReader,
        watchdog: Arc<Watchdog>,
    ) -> Result<(Self, MotorcontrolClient), ConfigError> {
        config.validate()?;
        let (tx, requests) = request_channel();
        let service = Self {
            commutation: Commutation::new(config),
            power,
            reader,
            watchdog,
            requests,
            measurements: PowerMeasurements::default(),
            last_fault: FaultCode::NoFault,
            last_output: PwmOutput::default(),
        };
        Ok((service, MotorcontrolClient::new(tx)))
    }

    /// Commutation state, for inspection.
    pub fn commutation(&self) -> &Commutation {
        &self.commutation
    }

    /// Output applied in the last tick.
    pub fn last_output(&self) -> &PwmOutput {
        &self.last_output
    }

    /// Power stage, for inspection.
    pub fn power(&self) -> &S {
        &self.power
    }

    fn upstream(&self) -> UpstreamControlData {
        let reading = self.reader.latest();
        UpstreamControlData {
            error_status: self.watchdog.latch().current(),
            computed_torque: self.commutation.torque_actual(),
            torque_set: self.commutation.torque_setpoint(),
            phase_current_ma: self.measurements.phase_current_ma,
            v_dc_mv: self.measurements.dc_voltage_mv,
            angle: reading.angle,
            position: reading.count,
            velocity: reading.velocity,
            temperature_c: self.measurements.temperature_c,
            sensor_status: reading.status,
        }
    }

    fn handle(&mut self, request: MotorcontrolRequest) {
        match request {
            // Setpoints received while faulted are dropped, not queued.
            MotorcontrolRequest::SetVoltage { voltage, response } => {
                if self.watchdog.latch().is_faulted() {
                    debug!(voltage, "Voltage command dropped while faulted");
                } else {
                    self.commutation.set_voltage(voltage);
                }
                respond(&response, ());
            }
            MotorcontrolRequest::SetTorque { torque, response } => {
                if self.watchdog.latch().is_faulted() {
                    debug!(torque, "Torque command dropped while faulted");
                } else {
                    self.commutation.set_torque(torque);
                }
                respond(&response, ());
            }
            MotorcontrolRequest::SetTorqueMax { torque, response } => {
                respond(&response, self.commutation.set_torque_max(torque));
            }
            MotorcontrolRequest::GetTorqueActual { response } => {
                respond(&response, self.commutation.torque_actual());
            }
            MotorcontrolRequest::GetVelocityActual { response } => {
                respond(&response, self.reader.latest().velocity);
            }
            MotorcontrolRequest::GetPositionActual { response } => {
                respond(&response, self.reader.latest().count);
            }
            MotorcontrolRequest::SetBrakeStatus { engaged, response } => {
                if engaged != self.commutation.brake() {
                    info!(engaged, "Brake output changed");
                }
                self.commutation.set_brake(engaged);
                respond(&response, ());
            }
            MotorcontrolRequest::SetFetsState { enabled, response } => {
                if enabled != self.commutation.fets_enabled() {
                    info!(enabled, "FET drivers switched");
                }
                self.commutation.set_fets_state(enabled);
                respond(&response, ());
            }
            MotorcontrolRequest::GetFetsState { response } => {
                respond(&response, self.commutation.fets_enabled());
            }
            MotorcontrolRequest::ResetFaults { response } => {
                self.commutation.clear_commands();
                respond(&response, self.watchdog.reset_faults());
            }
            MotorcontrolRequest::GetConfig { response } => {
                respond(&response, self.commutation.config().clone());
            }
            MotorcontrolRequest::SetConfig { config, response } => {
                let result = config.validate();
                match &result {
                    Ok(()) => {
                        info!(
                            motor = ?config.motor_type,
                            pole_pairs = config.pole_pairs,
                            "Motorcontrol reconfigured"
                        );
                        self.commutation.set_config(config);
                    }
                    Err(e) => debug!(error = %e, "Motorcontrol configuration rejected"),
                }
                respond(&response, result);
            }
            MotorcontrolRequest::SetSafeTorqueOff { response } => {
                warn!("Safe torque off requested");
                self.commutation.safe_torque_off();
                respond(&response, ());
            }
            MotorcontrolRequest::SetTorqueControlEnabled { enabled, response } => {
                self.commutation.set_torque_control_enabled(enabled);
                respond(&response, ());
            }
            MotorcontrolRequest::SetTorquePid { pid, response } => {
                let result = pid.validate();
                if result.is_ok() {
                    self.commutation.set_torque_pid(pid);
                }
                respond(&response, result);
            }
            MotorcontrolRequest::UpdateUpstream { response } => {
                respond(&response, self.upstream());
            }
        }
    }
}

impl<S: PowerStage + 'static> PeriodicTask for MotorcontrolService<S> {
    fn tick(&mut self, now_us: u64) {
        while let Ok(request) = self.requests.try_recv() {
            self.handle(request);
        }

        self.measurements = self.power.read_measurements();
        self.watchdog.heartbeat(now_us);
        self.watchdog.check_protection(&self.measurements);
        let fault = self.watchdog.latch().current();

        if fault != self.last_fault {
            if fault.is_fault() {
                warn!(fault = %fault, "Outputs forced off by latched fault");
                self.commutation.clear_commands();
            } else {
                info!(cleared = %self.last_fault, "Fault cleared, commands accepted again");
            }
            self.last_fault = fault;
        }

        let reading = self.reader.latest();
        self.last_output = self
            .commutation
            .step(reading.angle, &self.measurements, fault.is_fault());
        self.power.apply(&self.last_output);
    }

    fn on_stop(&mut self) {
        self.power.apply(&PwmOutput::off(self.commutation.brake()));
        info!("Motorcontrol service stopped, outputs off");
    }
}

/// Request interface of a [`MotorcontrolService`].
#[derive(Debug, Clone)]
pub struct MotorcontrolClient {
    inner: ServiceClient<MotorcontrolRequest>,
}

impl MotorcontrolClient {
    fn new(requests: Sender<MotorcontrolRequest>) -> Self {
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

    /// Command an open loop q-axis voltage.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_voltage(&self, voltage: f64) -> MotorcontrolResult<()> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::SetVoltage { voltage, response })?)
    }

    /// Command a torque in mNm.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_torque(&self, torque: f64) -> MotorcontrolResult<()> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::SetTorque { torque, response })?)
    }

    /// Set the torque ceiling; returns the ceiling in effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_torque_max(&self, torque: f64) -> MotorcontrolResult<f64> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::SetTorqueMax { torque, response })?)
    }

    /// Measured torque in mNm.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_torque_actual(&self) -> MotorcontrolResult<f64> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::GetTorqueActual { response })?)
    }

    /// Velocity in rpm.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_velocity_actual(&self) -> MotorcontrolResult<i32> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::GetVelocityActual { response })?)
    }

    /// Multiturn position count.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_position_actual(&self) -> MotorcontrolResult<i32> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::GetPositionActual { response })?)
    }

    /// Engage or release the brake.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_brake_status(&self, engaged: bool) -> MotorcontrolResult<()> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::SetBrakeStatus { engaged, response })?)
    }

    /// Switch the gate drivers. Enabling also leaves safe torque off.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_fets_state(&self, enabled: bool) -> MotorcontrolResult<()> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::SetFetsState { enabled, response })?)
    }

    /// Gate driver state.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_fets_state(&self) -> MotorcontrolResult<bool> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::GetFetsState { response })?)
    }

    /// Clear the latched fault. Returns the fault that was cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn reset_faults(&self) -> MotorcontrolResult<FaultCode> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::ResetFaults { response })?)
    }

    /// Active configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn get_config(&self) -> MotorcontrolResult<MotorcontrolConfig> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::GetConfig { response })?)
    }

    /// Replace the configuration between two commutation periods.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer or rejects `config`.
    pub fn set_config(&self, config: MotorcontrolConfig) -> MotorcontrolResult<()> {
        self.inner
            .call(|response| MotorcontrolRequest::SetConfig { config, response })??;
        Ok(())
    }

    /// Enter safe torque off.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_safe_torque_off(&self) -> MotorcontrolResult<()> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::SetSafeTorqueOff { response })?)
    }

    /// Enable or disable the torque PID.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn set_torque_control_enabled(&self, enabled: bool) -> MotorcontrolResult<()> {
        Ok(self.inner.call(|response| {
            MotorcontrolRequest::SetTorqueControlEnabled { enabled, response }
        })?)
    }

    /// Replace the torque PID parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer or rejects `pid`.
    pub fn set_torque_pid(&self, pid: PidConfig) -> MotorcontrolResult<()> {
        self.inner
            .call(|response| MotorcontrolRequest::SetTorquePid { pid, response })??;
        Ok(())
    }

    /// Measurement snapshot for the motion controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    pub fn update_upstream_control_data(&self) -> MotorcontrolResult<UpstreamControlData> {
        Ok(self
            .inner
            .call(|response| MotorcontrolRequest::UpdateUpstream { response })?)
    }
}
