//! Reference frame transforms and PWM modulation.
//!
//! Phase voltages are expressed in command units where
//! [`VOLTAGE_FULL_SCALE`] is full modulation. Angles are electrical radians.

use std::f64::consts::TAU;

use servoloop_feedback::ELECTRICAL_RESOLUTION;

/// Voltage command magnitude for full modulation.
pub const VOLTAGE_FULL_SCALE: i32 = 4_096;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Electrical angle ticks to radians.
#[must_use]
pub fn electrical_radians(angle: u32) -> f64 {
    f64::from(angle % ELECTRICAL_RESOLUTION) * TAU / f64::from(ELECTRICAL_RESOLUTION)
}

/// Amplitude-invariant Clarke transform of three phase quantities.
#[must_use]
pub fn clarke(phases: [f64; 3]) -> (f64, f64) {
    let [a, b, c] = phases;
    ((2.0 * a - b - c) / 3.0, (b - c) / SQRT_3)
}

/// Inverse Clarke transform.
#[must_use]
pub fn inverse_clarke(alpha: f64, beta: f64) -> [f64; 3] {
    let half = -alpha / 2.0;
    let leg = beta * SQRT_3 / 2.0;
    [alpha, half + leg, half - leg]
}

/// Park transform into the rotor frame at `theta`.
#[must_use]
pub fn park(alpha: f64, beta: f64, theta: f64) -> (f64, f64) {
    let (sin, cos) = theta.sin_cos();
    (alpha * cos + beta * sin, beta * cos - alpha * sin)
}

/// Inverse Park transform from the rotor frame at `theta`.
#[must_use]
pub fn inverse_park(d: f64, q: f64, theta: f64) -> (f64, f64) {
    let (sin, cos) = theta.sin_cos();
    (d * cos - q * sin, d * sin + q * cos)
}

/// Gate timings of the three half bridges for one PWM period.
///
/// For every enabled phase `high + low + dead_time == pwm_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PwmOutput {
    /// High side on-time per phase, in PWM counts.
    pub high: [u16; 3],
    /// Low side on-time per phase, in PWM counts.
    pub low: [u16; 3],
    /// Gate drivers enabled.
    pub enabled: bool,
    /// Brake output engaged.
    pub brake: bool,
}

impl PwmOutput {
    /// All switches open.
    #[must_use]
    pub fn off(brake: bool) -> Self {
        Self {
            brake,
            ..Self::default()
        }
    }

    /// `true` if no switch is driven.
    #[must_use]
    pub fn is_off(&self) -> bool {
        !self.enabled && self.high == [0; 3] && self.low == [0; 3]
    }

    /// Phase voltages implied by the timings, in command units.
    #[must_use]
    pub fn phase_voltages(&self, pwm_max: u16, dead_time: u16) -> [f64; 3] {
        if !self.enabled {
            return [0.0; 3];
        }
        let center = f64::from(pwm_max.saturating_sub(dead_time)) / 2.0;
        if center <= 0.0 {
            return [0.0; 3];
        }
        let scale = f64::from(VOLTAGE_FULL_SCALE) / center;
        self.high.map(|high| (f64::from(high) - center) * scale)
    }
}

/// Center-aligned sine modulation of phase voltages.
///
/// Voltages beyond full scale saturate.
#[must_use]
pub fn modulate(phase_voltages: [f64; 3], pwm_max: u16, dead_time: u16, brake: bool) -> PwmOutput {
    let span = pwm_max.saturating_sub(dead_time);
    let center = f64::from(span) / 2.0;
    let full_scale = f64::from(VOLTAGE_FULL_SCALE);

    let high = phase_voltages.map(|v| {
        let duty = center + v.max(-full_scale).min(full_scale) / full_scale * center;
        to_counts(duty, span)
    });
    let low = high.map(|high| span.saturating_sub(high));

    PwmOutput {
        high,
        low,
        enabled: true,
        brake,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_counts(duty: f64, span: u16) -> u16 {
    // Clamped to [0, span] first, so the cast cannot wrap.
    duty.round().max(0.0).min(f64::from(span)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_q_voltage_roundtrip_through_phases() {
        for angle in (0..4_096).step_by(97) {
            let theta = electrical_radians(angle);
            let (alpha, beta) = inverse_park(0.0, 1_000.0, theta);
            let phases = inverse_clarke(alpha, beta);
            assert_abs_diff_eq!(phases.iter().sum::<f64>(), 0.0, epsilon = 1e-9);
            let (alpha, beta) = clarke(phases);
            let (d, q) = park(alpha, beta, theta);
            assert_abs_diff_eq!(d, 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(q, 1_000.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_q_axis_leads_phase_a() {
        let (alpha, beta) = inverse_park(0.0, 1.0, 0.0);
        let [a, _, _] = inverse_clarke(alpha, beta);
        assert_abs_diff_eq!(a, 0.0, epsilon = 1e-12);
        let (alpha, beta) = inverse_park(0.0, 1.0, -FRAC_PI_2);
        let [a, _, _] = inverse_clarke(alpha, beta);
        assert_abs_diff_eq!(a, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_modulation_respects_dead_time() {
        let out = modulate([4_096.0, 0.0, -10_000.0], 1_000, 40, false);
        assert_eq!(out.high, [960, 480, 0]);
        for phase in 0..3 {
            let high = out.high.get(phase).copied().unwrap_or_default();
            let low = out.low.get(phase).copied().unwrap_or_default();
            assert_eq!(high + low + 40, 1_000);
        }
    }

    #[test]
    fn test_phase_voltages_invert_modulation() {
        let out = modulate([1_024.0, -2_048.0, 1_024.0], 4_096, 32, false);
        let [a, b, _] = out.phase_voltages(4_096, 32);
        assert_abs_diff_eq!(a, 1_024.0, epsilon = 3.0);
        assert_abs_diff_eq!(b, -2_048.0, epsilon = 3.0);
        let off = PwmOutput::off(true).phase_voltages(4_096, 32);
        assert!(off.iter().all(|v| v.abs() < 1e-12));
    }
}
