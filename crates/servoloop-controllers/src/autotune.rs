//! Velocity loop auto-tuning
//!
//! The tuner drives the motor open loop with a constant torque step, records
//! the velocity response and fits a first-order plant
//!
//! ```text
//! J dω/dt + f ω = T   =>   ω(t) = (T / f) (1 - exp(-t f / J))
//! ```
//!
//! From the identified inertia `J` and viscous friction `f` it places the
//! closed-loop poles of a PI velocity controller for the requested damping
//! ratio and settling time. A failed identification never touches the gains
//! of the running controller; the caller only gets gains on success.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};
use servoloop_errors::{ConfigError, TuningError};

use crate::pid::PidGains;

/// Maximum number of velocity samples recorded per run.
pub const MAX_TUNING_SAMPLES: usize = 1_000;

/// Fraction of the samples at the end of a run used as the steady state.
const STEADY_STATE_FRACTION: usize = 10;

/// Steady-state samples may deviate this much (relative) from their mean.
const SETTLED_TOLERANCE: f64 = 0.02;

const RPM_TO_RAD_S: f64 = TAU / 60.0;

/// Auto-tuner parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoTuneConfig {
    /// Torque step applied during identification, mNm
    pub torque_step: f64,
    /// Sample period in microseconds
    pub sample_period_us: u32,
    /// Number of samples to record, at most [`MAX_TUNING_SAMPLES`]
    pub samples: usize,
    /// Desired closed-loop damping ratio
    pub damping_ratio: f64,
    /// Desired 2% settling time, seconds
    pub settling_time: f64,
    /// Largest acceptable predicted overshoot, percent
    pub max_overshoot_percent: f64,
    /// Steady-state speed below which the motor counts as not moving, rpm
    pub min_velocity: f64,
}

impl Default for AutoTuneConfig {
    fn default() -> Self {
        Self {
            torque_step: 100.0,
            sample_period_us: 1_000,
            samples: MAX_TUNING_SAMPLES,
            damping_ratio: 1.0,
            settling_time: 0.05,
            max_overshoot_percent: 5.0,
            min_velocity: 10.0,
        }
    }
}

impl AutoTuneConfig {
    /// Sample period in seconds.
    #[must_use]
    pub fn sample_period_s(&self) -> f64 {
        f64::from(self.sample_period_us) / 1_000_000.0
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero sample period, a sample count
    /// outside `[2 * 10, MAX_TUNING_SAMPLES]`, or a non-positive damping
    /// ratio or settling time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        servoloop_errors::config::ensure_non_zero("sample_period_us", self.sample_period_us)?;
        let min_samples = 2usize.saturating_mul(STEADY_STATE_FRACTION);
        if !(min_samples..=MAX_TUNING_SAMPLES).contains(&self.samples) {
            return Err(ConfigError::out_of_range(
                "samples",
                self.samples,
                min_samples,
                MAX_TUNING_SAMPLES,
            ));
        }
        if !(self.damping_ratio > 0.0) {
            return Err(ConfigError::zero("damping_ratio"));
        }
        if !(self.settling_time > 0.0) {
            return Err(ConfigError::zero("settling_time"));
        }
        Ok(())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningResult {
    /// Identified moment of inertia, kg·m²
    pub inertia: f64,
    /// Identified viscous friction, Nm/(rad/s)
    pub friction: f64,
    /// Velocity PI(D) gains in mNm per rpm
    pub gains: PidGains,
    /// Predicted overshoot in percent
    pub predicted_overshoot: f64,
}

/// What the tuner wants applied next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutoTuneStep {
    /// Keep applying this torque (mNm) and report the next velocity
    Excite(f64),
    /// Identification finished
    Done(TuningResult),
}

/// Sampling auto-tuner for the velocity loop.
#[derive(Debug, Clone)]
pub struct VelocityAutoTuner {
    config: AutoTuneConfig,
    velocities: Vec<f64>,
    running: bool,
}

impl VelocityAutoTuner {
    /// Create an idle tuner.
    #[must_use]
    pub fn new(config: AutoTuneConfig) -> Self {
        Self {
            config,
            velocities: Vec::with_capacity(config.samples.min(MAX_TUNING_SAMPLES)),
            running: false,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &AutoTuneConfig {
        &self.config
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start a run and return the torque to apply.
    pub fn start(&mut self) -> f64 {
        self.velocities.clear();
        self.running = true;
        self.config.torque_step
    }

    /// Abort a run.
    pub fn abort(&mut self) {
        self.running = false;
        self.velocities.clear();
    }

    /// Record the velocity (rpm) measured in the last sample.
    ///
    /// # Errors
    ///
    /// - [`TuningError::NotRunning`] without a started run
    /// - [`TuningError::NoMotion`], [`TuningError::NotSettled`],
    ///   [`TuningError::NonPhysical`] or [`TuningError::Overshoot`] when the
    ///   recorded response cannot be turned into gains; the run ends.
    pub fn update(&mut self, velocity_rpm: f64) -> Result<AutoTuneStep, TuningError> {
        if !self.running {
            return Err(TuningError::NotRunning);
        }
        self.velocities.push(velocity_rpm * RPM_TO_RAD_S);
        if self.velocities.len() < self.config.samples.min(MAX_TUNING_SAMPLES) {
            return Ok(AutoTuneStep::Excite(self.config.torque_step));
        }
        self.running = false;
        identify(&self.config, &self.velocities).map(AutoTuneStep::Done)
    }
}

/// Fit the recorded step response (rad/s) and compute velocity gains.
///
/// # Errors
///
/// See [`VelocityAutoTuner::update`].
#[allow(clippy::cast_precision_loss)]
pub fn identify(config: &AutoTuneConfig, velocities: &[f64]) -> Result<TuningResult, TuningError> {
    let samples = velocities.len();
    let tail_len = (samples / STEADY_STATE_FRACTION).max(1);
    let tail = velocities
        .get(samples.saturating_sub(tail_len)..)
        .unwrap_or_default();
    if tail.is_empty() {
        return Err(TuningError::NotSettled { samples });
    }

    let steady = tail.iter().sum::<f64>() / tail.len() as f64;
    if steady.abs() < config.min_velocity.abs() * RPM_TO_RAD_S || steady.abs() <= f64::EPSILON {
        return Err(TuningError::NoMotion);
    }
    let deviation = tail
        .iter()
        .map(|w| (w - steady).abs())
        .fold(0.0f64, f64::max);
    if deviation > SETTLED_TOLERANCE * steady.abs() {
        return Err(TuningError::NotSettled { samples });
    }

    let threshold = (1.0 - (-1.0f64).exp()) * steady.abs();
    let crossing = velocities
        .iter()
        .position(|w| w.abs() >= threshold)
        .ok_or(TuningError::NotSettled { samples })?;
    let dt = config.sample_period_s();
    let tau = (crossing as f64 + 1.0) * dt;

    let torque = config.torque_step / 1_000.0;
    let friction = torque / steady;
    let inertia = friction * tau;
    if !(friction > 0.0 && inertia > 0.0 && friction.is_finite() && inertia.is_finite()) {
        return Err(TuningError::NonPhysical { inertia, friction });
    }

    let z = config.damping_ratio;
    let wn = 4.0 / (z * config.settling_time);
    let kp = 2.0 * z * wn * inertia - friction;
    let ki = inertia * wn * wn;
    if !(kp > 0.0) {
        return Err(TuningError::NonPhysical { inertia, friction });
    }

    let predicted_overshoot = if z < 1.0 {
        100.0 * (-PI * z / (1.0 - z * z).sqrt()).exp()
    } else {
        0.0
    };
    if predicted_overshoot > config.max_overshoot_percent {
        return Err(TuningError::Overshoot {
            predicted: predicted_overshoot,
            limit: config.max_overshoot_percent,
        });
    }

    // Nm per rad/s to mNm per rpm.
    let scale = 1_000.0 * RPM_TO_RAD_S;
    Ok(TuningResult {
        inertia,
        friction,
        gains: PidGains::new(kp * scale, ki * scale, 0.0),
        predicted_overshoot,
    })
}
