//! Motion control state machine and control cascade.
//!
//! ```text
//!            enable_*             fault
//! Disabled ───────────► Torque ──────────► Faulted
//!    ▲  ▲               Velocity             │
//!    │  │               Position(strategy)   │ clear_fault
//!    │  └── disable ─── AutoTune             │
//!    └───────────────────────────────────────┘
//! ```
//!
//! The coordinator is plain state; the motion control service feeds it one
//! [`MotionFeedback`] per period and forwards the returned [`MotorCommand`]
//! to motorcontrol. Entering a mode resets the controllers that mode runs.

use servoloop_controllers::{
    AutoTuneConfig, AutoTuneStep, NonlinearPositionController, PidController, PositionProfiler,
    TorqueRamp, TuningError, TuningResult, VelocityAutoTuner, VelocityRamp, VelocityRampConfig,
    rpm_to_ticks, saturate,
};
use servoloop_errors::FaultCode;
use tracing::{info, warn};

use crate::config::{ControlStrategy, MotionControlConfig};
use crate::control_data::{DownstreamControlData, UpstreamControlData};
use crate::error::{MotionError, MotionResult};

/// Operating state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    /// No torque is commanded.
    #[default]
    Disabled,
    /// Torque control.
    Torque,
    /// Velocity control.
    Velocity,
    /// Position control with the given cascade.
    Position(ControlStrategy),
    /// Velocity loop identification in progress.
    AutoTune,
    /// A fault was latched; only `clear_fault` leaves this state.
    Faulted(FaultCode),
}

impl MotionState {
    /// Whether torque is being commanded.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Disabled | Self::Faulted(_))
    }
}

/// Feedback sampled at the start of a period, in drive frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionFeedback {
    /// Multiturn position in ticks.
    pub position: i32,
    /// Velocity in rpm.
    pub velocity: i32,
    /// Currently latched fault.
    pub fault: FaultCode,
}

/// Output of one period, in drive frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorCommand {
    /// Torque setpoint in mNm.
    pub torque: f64,
    /// Whether the torque loop must run.
    pub torque_control: bool,
    /// Holding brake engaged.
    pub brake: bool,
}

/// Motion control coordinator.
#[derive(Debug, Clone)]
pub struct MotionControlCoordinator {
    config: MotionControlConfig,
    state: MotionState,
    downstream: DownstreamControlData,
    position_pid: PidController,
    velocity_pid: PidController,
    nonlinear: NonlinearPositionController,
    profiler: PositionProfiler,
    velocity_ramp: VelocityRamp,
    torque_ramp: TorqueRamp,
    tuner: Option<VelocityAutoTuner>,
    tuning_result: Option<Result<TuningResult, TuningError>>,
    target: Option<f64>,
    reference: f64,
    previous_position: f64,
    position: i32,
    velocity: i32,
    torque: f64,
    brake_release_ticks: u32,
}

impl MotionControlCoordinator {
    /// Create a disabled coordinator.
    #[must_use]
    pub fn new(config: MotionControlConfig) -> Self {
        Self {
            position_pid: PidController::new(config.position_pid),
            velocity_pid: PidController::new(config.velocity_pid),
            nonlinear: NonlinearPositionController::new(config.nonlinear_config()),
            profiler: PositionProfiler::new(config.profile_limits(), config.control_period_us),
            velocity_ramp: VelocityRamp::new(velocity_ramp_config(&config), config.control_period_us),
            torque_ramp: TorqueRamp::new(config.profiler.torque_slope, config.control_period_us),
            config,
            state: MotionState::Disabled,
            downstream: DownstreamControlData::default(),
            tuner: None,
            tuning_result: None,
            target: None,
            reference: 0.0,
            previous_position: 0.0,
            position: 0,
            velocity: 0,
            torque: 0.0,
            brake_release_ticks: 0,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &MotionControlConfig {
        &self.config
    }

    /// Replace the configuration. Controllers and profiles restart; the
    /// current state is kept.
    pub fn set_config(&mut self, config: MotionControlConfig) {
        self.position_pid = PidController::new(config.position_pid);
        self.velocity_pid = PidController::new(config.velocity_pid);
        self.nonlinear = NonlinearPositionController::new(config.nonlinear_config());
        self.profiler = PositionProfiler::new(config.profile_limits(), config.control_period_us);
        self.velocity_ramp = VelocityRamp::new(velocity_ramp_config(&config), config.control_period_us);
        self.velocity_ramp.reset(f64::from(self.velocity));
        self.torque_ramp = TorqueRamp::new(config.profiler.torque_slope, config.control_period_us);
        self.torque_ramp.reset(self.torque);
        self.target = None;
        self.reference = f64::from(self.position);
        self.config = config;
    }

    /// Update the moment of inertia used by the nonlinear controller.
    pub fn set_j(&mut self, j: f64) {
        self.config.nonlinear.j = j;
        self.nonlinear.set_j(j);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Last received setpoints.
    #[must_use]
    pub fn downstream(&self) -> &DownstreamControlData {
        &self.downstream
    }

    /// Replace the setpoints.
    pub fn set_downstream(&mut self, downstream: DownstreamControlData) {
        self.downstream = downstream;
    }

    /// Set the torque used in torque control, mNm.
    pub fn set_torque(&mut self, torque: f64) {
        self.downstream.torque_cmd = torque;
    }

    /// Last position, with polarity applied.
    #[must_use]
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Last velocity, with polarity applied.
    #[must_use]
    pub fn velocity(&self) -> i32 {
        self.velocity
    }

    /// Position reference of the last period.
    #[must_use]
    pub fn reference(&self) -> f64 {
        self.reference
    }

    /// Velocity loop, for inspection.
    #[must_use]
    pub fn velocity_pid(&self) -> &PidController {
        &self.velocity_pid
    }

    /// Outcome of the last auto-tuning run.
    #[must_use]
    pub fn tuning_result(&self) -> Option<&Result<TuningResult, TuningError>> {
        self.tuning_result.as_ref()
    }

    fn ensure_not_faulted(&self) -> MotionResult<()> {
        match self.state {
            MotionState::Faulted(fault) => Err(MotionError::Faulted(fault)),
            _ => Ok(()),
        }
    }

    /// Switch to `state`. The brake release delay is armed only when coming
    /// from an inactive state; switching between active modes keeps the
    /// brake released.
    fn enter(&mut self, state: MotionState) {
        if !self.state.is_active() && self.config.brake.enabled {
            let period_us = self.config.control_period_us.max(1);
            self.brake_release_ticks = self.config.brake.release_delay_ms.saturating_mul(1_000) / period_us;
        }
        if self.state != state {
            info!(from = ?self.state, to = ?state, "Motion control mode changed");
        }
        self.state = state;
    }

    /// Enter position control with `strategy`, holding the current position.
    ///
    /// # Errors
    ///
    /// Returns an error while faulted or if `strategy` is not a position
    /// strategy.
    pub fn enable_position(&mut self, strategy: ControlStrategy) -> MotionResult<()> {
        self.ensure_not_faulted()?;
        if !strategy.is_position() {
            return Err(MotionError::NotPositionStrategy(strategy));
        }
        self.position_pid.reset();
        self.velocity_pid.reset();
        self.nonlinear.reset();
        self.profiler.reset();
        self.target = None;
        self.reference = f64::from(self.position);
        self.previous_position = f64::from(self.position);
        self.downstream.position_cmd = self.position;
        self.config.strategy = strategy;
        self.enter(MotionState::Position(strategy));
        Ok(())
    }

    /// Enter velocity control, ramping down to standstill.
    ///
    /// # Errors
    ///
    /// Returns an error while faulted.
    pub fn enable_velocity(&mut self) -> MotionResult<()> {
        self.ensure_not_faulted()?;
        self.velocity_pid.reset();
        self.velocity_ramp.reset(f64::from(self.velocity));
        self.downstream.velocity_cmd = 0;
        self.enter(MotionState::Velocity);
        Ok(())
    }

    /// Enter torque control at zero torque.
    ///
    /// # Errors
    ///
    /// Returns an error while faulted.
    pub fn enable_torque(&mut self) -> MotionResult<()> {
        self.ensure_not_faulted()?;
        self.torque_ramp.reset(0.0);
        self.downstream.torque_cmd = 0.0;
        self.enter(MotionState::Torque);
        Ok(())
    }

    /// Start identifying the velocity loop. On success the identified gains
    /// replace the velocity loop gains; on failure they are left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error unless disabled, or if `config` is invalid.
    pub fn start_autotune(&mut self, config: AutoTuneConfig) -> MotionResult<()> {
        self.ensure_not_faulted()?;
        if self.state != MotionState::Disabled {
            return Err(MotionError::NotDisabled);
        }
        let config = AutoTuneConfig {
            sample_period_us: self.config.control_period_us,
            ..config
        };
        config.validate()?;
        let mut tuner = VelocityAutoTuner::new(config);
        let torque = tuner.start();
        self.tuner = Some(tuner);
        self.tuning_result = None;
        self.downstream.torque_cmd = torque;
        self.enter(MotionState::AutoTune);
        Ok(())
    }

    /// Stop commanding torque.
    pub fn disable(&mut self) {
        if self.state == MotionState::AutoTune {
            self.tuner = None;
        }
        if self.state.is_active() {
            info!(from = ?self.state, "Motion control disabled");
            self.state = MotionState::Disabled;
        }
        self.torque = 0.0;
    }

    /// Leave the faulted state. Returns `true` if it was faulted.
    pub fn clear_fault(&mut self) -> bool {
        match self.state {
            MotionState::Faulted(fault) => {
                info!(fault = %fault, "Motion control fault cleared");
                self.state = MotionState::Disabled;
                true
            }
            _ => false,
        }
    }

    /// Express motorcontrol measurements in the caller's frame.
    #[must_use]
    pub fn to_user_frame(&self, upstream: UpstreamControlData) -> UpstreamControlData {
        let polarity = self.config.polarity;
        UpstreamControlData {
            computed_torque: polarity.apply_f64(upstream.computed_torque),
            torque_set: polarity.apply_f64(upstream.torque_set),
            position: polarity.apply(upstream.position),
            velocity: polarity.apply(upstream.velocity),
            ..upstream
        }
    }

    /// Run one control period.
    pub fn step(&mut self, feedback: &MotionFeedback) -> MotorCommand {
        let polarity = self.config.polarity;
        self.position = polarity.apply(feedback.position);
        self.velocity = polarity.apply(feedback.velocity);

        if feedback.fault.is_fault() && !matches!(self.state, MotionState::Faulted(_)) {
            warn!(fault = %feedback.fault, from = ?self.state, "Motion control faulted");
            self.tuner = None;
            self.state = MotionState::Faulted(feedback.fault);
        }

        let position = f64::from(self.position);
        let torque = self.control(position, f64::from(self.velocity));
        self.previous_position = position;

        match torque {
            Some(torque) => {
                self.torque = saturate(torque, self.config.max_torque);
                MotorCommand {
                    torque: polarity.apply_f64(self.torque),
                    torque_control: true,
                    brake: false,
                }
            }
            None => {
                self.torque = 0.0;
                MotorCommand {
                    torque: 0.0,
                    torque_control: false,
                    brake: self.config.brake.enabled,
                }
            }
        }
    }

    fn control(&mut self, position: f64, velocity: f64) -> Option<f64> {
        if self.state.is_active() && self.brake_release_ticks > 0 {
            self.brake_release_ticks -= 1;
            self.reference = position;
            return Some(0.0);
        }
        let offset = self.downstream.offset_torque;
        match self.state {
            MotionState::Disabled | MotionState::Faulted(_) => None,
            MotionState::Torque => Some(self.torque_setpoint()),
            MotionState::Velocity | MotionState::Position(ControlStrategy::VelocityPid) => {
                let setpoint = self.velocity_setpoint();
                Some(self.velocity_pid.update(setpoint, velocity) + offset)
            }
            MotionState::Position(strategy) => {
                let reference = self.position_reference();
                let torque = match strategy {
                    ControlStrategy::PositionPid => self.position_pid.update(reference, position),
                    ControlStrategy::NonlinearPosition => {
                        self.nonlinear.update(reference, self.previous_position, position)
                    }
                    _ => {
                        let speed = saturate(
                            self.position_pid.update(reference, position),
                            self.config.max_speed,
                        );
                        self.velocity_pid.update(speed, velocity)
                    }
                };
                Some(torque + offset)
            }
            MotionState::AutoTune => self.autotune(velocity),
        }
    }

    fn torque_setpoint(&mut self) -> f64 {
        let target = saturate(self.downstream.torque_cmd, self.config.max_torque);
        if self.config.profiler.enabled {
            self.torque_ramp.set_target(target);
            self.torque_ramp.next_setpoint()
        } else {
            target
        }
    }

    fn velocity_setpoint(&mut self) -> f64 {
        let target = saturate(f64::from(self.downstream.velocity_cmd), self.config.max_speed);
        if self.config.profiler.enabled {
            self.velocity_ramp.set_target(target);
            self.velocity_ramp.next_setpoint()
        } else {
            target
        }
    }

    fn position_reference(&mut self) -> f64 {
        let limits = self.config.profile_limits();
        let target = limits.clamp_position(f64::from(self.downstream.position_cmd));
        let reference = if self.config.profiler.enabled {
            if self.target.is_none_or(|previous| (previous - target).abs() > f64::EPSILON) {
                let profiler = self.config.profiler;
                let ticks = self.config.ticks_per_turn;
                self.profiler.start(
                    target,
                    self.reference,
                    rpm_to_ticks(profiler.velocity, ticks),
                    rpm_to_ticks(profiler.acceleration, ticks),
                    rpm_to_ticks(profiler.deceleration, ticks),
                );
                self.target = Some(target);
            }
            self.profiler.next_setpoint().unwrap_or(target)
        } else {
            target
        };
        self.reference = limits.clamp_position(reference);
        self.reference
    }

    fn autotune(&mut self, velocity: f64) -> Option<f64> {
        let step = self.tuner.as_mut().map(|tuner| tuner.update(velocity));
        match step {
            Some(Ok(AutoTuneStep::Excite(torque))) => return Some(torque),
            Some(Ok(AutoTuneStep::Done(result))) => {
                info!(
                    inertia = result.inertia,
                    friction = result.friction,
                    kp = result.gains.kp,
                    ki = result.gains.ki,
                    "Velocity loop tuned"
                );
                self.config.velocity_pid.gains = result.gains;
                self.velocity_pid.set_gains(result.gains);
                self.tuning_result = Some(Ok(result));
            }
            Some(Err(e)) => {
                warn!(error = %e, "Velocity loop tuning failed, gains unchanged");
                self.tuning_result = Some(Err(e));
            }
            None => {}
        }
        self.tuner = None;
        self.state = MotionState::Disabled;
        None
    }
}

fn velocity_ramp_config(config: &MotionControlConfig) -> VelocityRampConfig {
    VelocityRampConfig {
        max_velocity: config.max_speed,
        acceleration: config.profiler.acceleration,
        deceleration: config.profiler.deceleration,
    }
}
