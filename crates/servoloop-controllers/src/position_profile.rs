//! Position profile: linear function with parabolic blends (LFPB)
//!
//! A move is planned once and then sampled every control tick. The plan is a
//! trapezoidal velocity profile whose acceleration and deceleration phases
//! are quadratic position segments:
//!
//! ```text
//! q(t) = a + b t + c t²                 0       <= t < tb_acc
//! q(t) = d + v t                        tb_acc  <= t < tf - tb_dec
//! q(t) = e + f (t - tf) + g (t - tf)²   tf - tb_dec <= t <= tf
//! q(t) = target                         t > tf
//! ```
//!
//! Units are whatever the caller uses consistently, typically ticks, ticks/s
//! and ticks/s².

use serde::{Deserialize, Serialize};
use servoloop_errors::ConfigError;

/// Acceleration is capped at this many times the move distance per second².
pub const ACCELERATION_LIMIT_FACTOR: f64 = 10.0;

/// Moves shorter than this jump straight to the target.
pub const MIN_PROFILE_DISTANCE: f64 = 1e-6;

/// Convert a speed or acceleration in rpm (rpm/s) to ticks/s (ticks/s²).
#[must_use]
pub fn rpm_to_ticks(rpm: f64, ticks_per_turn: u32) -> f64 {
    rpm * f64::from(ticks_per_turn) / 60.0
}

/// Limits applied to every planned move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionProfileLimits {
    /// Lowest reachable position
    pub min_position: f64,
    /// Highest reachable position
    pub max_position: f64,
    /// Velocity ceiling
    pub max_velocity: f64,
    /// Acceleration and deceleration ceiling
    pub max_acceleration: f64,
}

impl Default for PositionProfileLimits {
    fn default() -> Self {
        Self {
            min_position: -1e9,
            max_position: 1e9,
            max_velocity: 1e6,
            max_acceleration: 1e7,
        }
    }
}

impl PositionProfileLimits {
    /// Validate the limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the position limits are inverted or a
    /// ceiling is not positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_position > self.max_position {
            return Err(ConfigError::inverted("min_position", "max_position"));
        }
        if !(self.max_velocity > 0.0) {
            return Err(ConfigError::zero("max_velocity"));
        }
        if !(self.max_acceleration > 0.0) {
            return Err(ConfigError::zero("max_acceleration"));
        }
        Ok(())
    }

    /// Clamp a target into the position window.
    #[must_use]
    pub fn clamp_position(&self, position: f64) -> f64 {
        position.min(self.max_position).max(self.min_position)
    }
}

/// A planned move, evaluated in closed form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionProfile {
    start: f64,
    target: f64,
    velocity: f64,
    acceleration: f64,
    deceleration: f64,
    tb_acc: f64,
    tb_dec: f64,
    tf: f64,
    c: f64,
    d: f64,
    g: f64,
}

struct Blend {
    tb_acc: f64,
    tb_dec: f64,
    cruise: f64,
}

fn blend(distance: f64, velocity: f64, acceleration: f64, deceleration: f64) -> Blend {
    let tb_acc = velocity / acceleration;
    let tb_dec = velocity / deceleration;
    let distance_acc = acceleration * tb_acc * tb_acc / 2.0;
    let distance_dec = deceleration * tb_dec * tb_dec / 2.0;
    Blend {
        tb_acc,
        tb_dec,
        cruise: distance - distance_acc - distance_dec,
    }
}

impl PositionProfile {
    /// Plan a move from `actual` to `target`.
    ///
    /// The target is clamped to the position window and the velocity and
    /// accelerations to their ceilings. A non-positive request falls back to
    /// the ceiling. When the blends alone would overshoot, the cruise velocity
    /// is reduced and the accelerations raised in at most two passes until
    /// the plan is feasible.
    ///
    /// # Example
    ///
    /// ```
    /// use servoloop_controllers::{PositionProfile, PositionProfileLimits};
    ///
    /// let profile = PositionProfile::plan(&PositionProfileLimits::default(), 1000.0, 0.0, 100.0, 50.0, 50.0);
    /// assert!((profile.duration() - 12.0).abs() < 1e-9);
    /// assert!((profile.position_at(6.0) - 500.0).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn plan(
        limits: &PositionProfileLimits,
        target: f64,
        actual: f64,
        velocity: f64,
        acceleration: f64,
        deceleration: f64,
    ) -> Self {
        let target = limits.clamp_position(target);
        let signed_distance = target - actual;
        let distance = signed_distance.abs();

        let ceiling = |requested: f64, max: f64| {
            if requested > 0.0 { requested.min(max) } else { max }
        };
        let mut velocity = ceiling(velocity, limits.max_velocity);
        let acc_cap = (ACCELERATION_LIMIT_FACTOR * distance).min(limits.max_acceleration);
        let mut acceleration = ceiling(acceleration, acc_cap);
        let mut deceleration = ceiling(deceleration, acc_cap);

        let usable = distance > MIN_PROFILE_DISTANCE
            && velocity > 0.0
            && acceleration > 0.0
            && deceleration > 0.0;
        if !usable {
            return Self::hold(target);
        }

        let mut plan = blend(distance, velocity, acceleration, deceleration);
        if plan.cruise < 0.0 {
            velocity = velocity.min(distance);
            acceleration = acceleration.max(velocity);
            deceleration = deceleration.max(velocity);
            plan = blend(distance, velocity, acceleration, deceleration);
        }
        if plan.cruise < 0.0 {
            acceleration = acceleration.max(velocity);
            deceleration = deceleration.max(velocity);
            plan = blend(distance, velocity, acceleration, deceleration);
        }

        let t_cruise = plan.cruise.max(0.0) / velocity;
        let tf = plan.tb_acc + plan.tb_dec + t_cruise;
        let v = velocity.copysign(signed_distance);

        let c = v / (2.0 * plan.tb_acc);
        let d = actual + c * plan.tb_acc * plan.tb_acc - v * plan.tb_acc;
        let g = (d + (tf - plan.tb_dec) * v - target) / (plan.tb_dec * plan.tb_dec);

        Self {
            start: actual,
            target,
            velocity: v,
            acceleration,
            deceleration,
            tb_acc: plan.tb_acc,
            tb_dec: plan.tb_dec,
            tf,
            c,
            d,
            g,
        }
    }

    fn hold(target: f64) -> Self {
        Self {
            start: target,
            target,
            velocity: 0.0,
            acceleration: 0.0,
            deceleration: 0.0,
            tb_acc: 0.0,
            tb_dec: 0.0,
            tf: 0.0,
            c: 0.0,
            d: target,
            g: 0.0,
        }
    }

    /// Position at time `t` seconds after the start of the move.
    #[must_use]
    pub fn position_at(&self, t: f64) -> f64 {
        if t <= 0.0 {
            self.start
        } else if t < self.tb_acc {
            self.start + self.c * t * t
        } else if t < self.tf - self.tb_dec {
            self.d + self.velocity * t
        } else if t <= self.tf {
            let to_end = t - self.tf;
            self.target + self.g * to_end * to_end
        } else {
            self.target
        }
    }

    /// Total duration of the move in seconds.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.tf
    }

    /// Number of samples of `sample_period_s` covering the move, rounded.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn steps(&self, sample_period_s: f64) -> u64 {
        if sample_period_s > 0.0 {
            (self.tf / sample_period_s).round().max(0.0) as u64
        } else {
            0
        }
    }

    /// Start position.
    #[must_use]
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Clamped target position.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Signed cruise velocity.
    #[must_use]
    pub fn cruise_velocity(&self) -> f64 {
        self.velocity
    }

    /// Effective acceleration and deceleration after the feasibility passes.
    #[must_use]
    pub fn accelerations(&self) -> (f64, f64) {
        (self.acceleration, self.deceleration)
    }
}

/// Per-tick sampler of planned moves.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionProfiler {
    limits: PositionProfileLimits,
    sample_period_s: f64,
    profile: Option<PositionProfile>,
    step: u64,
}

impl PositionProfiler {
    /// Create an idle profiler sampling every `sample_period_us`.
    #[must_use]
    pub fn new(limits: PositionProfileLimits, sample_period_us: u32) -> Self {
        Self {
            limits,
            sample_period_s: f64::from(sample_period_us) / 1_000_000.0,
            profile: None,
            step: 0,
        }
    }

    /// Active limits.
    #[must_use]
    pub fn limits(&self) -> &PositionProfileLimits {
        &self.limits
    }

    /// Replace the limits for subsequent moves.
    pub fn set_limits(&mut self, limits: PositionProfileLimits) {
        self.limits = limits;
    }

    /// Plan a new move starting at the next sample.
    pub fn start(
        &mut self,
        target: f64,
        actual: f64,
        velocity: f64,
        acceleration: f64,
        deceleration: f64,
    ) -> &PositionProfile {
        self.step = 0;
        self.profile
            .insert(PositionProfile::plan(&self.limits, target, actual, velocity, acceleration, deceleration))
    }

    /// The move being sampled.
    #[must_use]
    pub fn profile(&self) -> Option<&PositionProfile> {
        self.profile.as_ref()
    }

    /// Advance one sample and return the setpoint, or `None` when idle.
    pub fn next_setpoint(&mut self) -> Option<f64> {
        let profile = self.profile.as_ref()?;
        self.step = self.step.saturating_add(1);
        #[allow(clippy::cast_precision_loss)]
        let t = self.step as f64 * self.sample_period_s;
        Some(profile.position_at(t))
    }

    /// Whether the current move has reached its target time.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.profile
            .as_ref()
            .is_none_or(|profile| self.step >= profile.steps(self.sample_period_s))
    }

    /// Drop the current move.
    pub fn reset(&mut self) {
        self.profile = None;
        self.step = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn limits() -> PositionProfileLimits {
        PositionProfileLimits {
            min_position: -100_000.0,
            max_position: 100_000.0,
            max_velocity: 1_000.0,
            max_acceleration: 10_000.0,
        }
    }

    #[test]
    fn test_trapezoid_phases() {
        let p = PositionProfile::plan(&limits(), 1_000.0, 0.0, 100.0, 50.0, 50.0);
        assert_relative_eq!(p.duration(), 12.0, max_relative = 1e-12);
        assert_relative_eq!(p.position_at(2.0), 100.0, max_relative = 1e-9);
        assert_relative_eq!(p.position_at(10.0), 900.0, max_relative = 1e-9);
        assert_relative_eq!(p.position_at(12.0), 1_000.0);
        assert_relative_eq!(p.position_at(20.0), 1_000.0);
        assert_eq!(p.steps(0.001), 12_000);
    }

    #[test]
    fn test_negative_direction_mirrors() {
        let p = PositionProfile::plan(&limits(), -1_000.0, 0.0, 100.0, 50.0, 50.0);
        assert_relative_eq!(p.cruise_velocity(), -100.0);
        assert_relative_eq!(p.position_at(6.0), -500.0, max_relative = 1e-9);
        assert_relative_eq!(p.position_at(12.0), -1_000.0);
    }

    #[test]
    fn test_target_is_clamped() {
        let p = PositionProfile::plan(&limits(), 1e9, 0.0, 100.0, 50.0, 50.0);
        assert_relative_eq!(p.target(), 100_000.0);
    }

    #[test]
    fn test_velocity_is_clamped() {
        let p = PositionProfile::plan(&limits(), 50_000.0, 0.0, 1e9, 100.0, 100.0);
        assert_relative_eq!(p.cruise_velocity(), 1_000.0);
    }

    #[test]
    fn test_short_move_reduces_velocity() {
        // Blends at v = 100, a = 10 would need 1000 ticks for a 20 tick move.
        let p = PositionProfile::plan(&limits(), 20.0, 0.0, 100.0, 10.0, 10.0);
        assert_relative_eq!(p.cruise_velocity(), 20.0);
        let (acc, dec) = p.accelerations();
        assert!(acc >= 20.0 && dec >= 20.0);
        assert_relative_eq!(p.position_at(p.duration()), 20.0);
        assert!(p.position_at(p.duration() / 2.0) <= 20.0);
    }

    #[test]
    fn test_zero_distance_holds() {
        let p = PositionProfile::plan(&limits(), 5.0, 5.0, 100.0, 50.0, 50.0);
        assert_abs_diff_eq!(p.duration(), 0.0);
        assert_relative_eq!(p.position_at(0.0), 5.0);
        assert_relative_eq!(p.position_at(1.0), 5.0);
        assert!(p.position_at(0.5).is_finite());
    }

    #[test]
    fn test_profiler_samples_until_done() {
        let mut profiler = PositionProfiler::new(limits(), 1_000);
        assert!(profiler.is_done());
        assert_eq!(profiler.next_setpoint(), None);

        profiler.start(1_000.0, 0.0, 100.0, 50.0, 50.0);
        let mut last = 0.0;
        let mut samples = 0;
        while !profiler.is_done() {
            let Some(setpoint) = profiler.next_setpoint() else {
                break;
            };
            assert!(setpoint >= last);
            last = setpoint;
            samples += 1;
        }
        assert_eq!(samples, 12_000);
        assert_relative_eq!(last, 1_000.0);
    }

    #[test]
    fn test_validate_limits() {
        assert!(limits().validate().is_ok());
        let inverted = PositionProfileLimits {
            min_position: 1.0,
            max_position: -1.0,
            ..limits()
        };
        assert!(inverted.validate().is_err());
        let stalled = PositionProfileLimits {
            max_velocity: 0.0,
            ..limits()
        };
        assert!(stalled.validate().is_err());
    }

    #[test]
    fn test_rpm_to_ticks() {
        assert_relative_eq!(rpm_to_ticks(60.0, 4_096), 4_096.0);
    }
}
