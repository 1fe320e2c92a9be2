//! Sine commutation and the field-oriented torque loop.
//!
//! [`Commutation`] is the complete state of the fast loop. It is owned by the
//! motorcontrol task and stepped once per commutation period:
//!
//! 1. the commutation angle is the sensor's electrical angle plus the offset
//!    for the commanded direction of rotation,
//! 2. the measured phase currents are transformed into the rotor frame to
//!    estimate the delivered torque,
//! 3. the q-axis voltage comes either straight from `set_voltage` or from
//!    the torque PID,
//! 4. the voltage vector is turned into three phase voltages and modulated
//!    with dead time.
//!
//! A latched fault, safe torque off or disabled FETs short-circuit all of
//! this to [`PwmOutput::off`] and reset the torque loop.

use std::f64::consts::FRAC_PI_6;

use servoloop_controllers::{PidConfig, PidController, saturate};
use servoloop_watchdog::PowerMeasurements;

use crate::config::{MotorType, MotorcontrolConfig, WindingType};
use crate::foc::{
    PwmOutput, VOLTAGE_FULL_SCALE, clarke, electrical_radians, inverse_clarke, inverse_park,
    modulate, park,
};

/// Source of the q-axis voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandMode {
    /// Open loop voltage from `set_voltage`.
    #[default]
    Voltage,
    /// Closed loop torque from `set_torque`.
    Torque,
}

/// Commutation and torque loop state.
#[derive(Debug, Clone)]
pub struct Commutation {
    config: MotorcontrolConfig,
    torque_pid: PidController,
    mode: CommandMode,
    voltage_setpoint: f64,
    torque_setpoint: f64,
    torque_max: f64,
    torque_control_enabled: bool,
    fets_enabled: bool,
    safe_torque_off: bool,
    brake: bool,
    torque_actual: f64,
    q_voltage: f64,
}

impl Commutation {
    /// Create the commutation with outputs disabled.
    #[must_use]
    pub fn new(config: MotorcontrolConfig) -> Self {
        Self {
            torque_pid: PidController::new(config.torque_pid),
            torque_max: f64::from(config.max_torque),
            config,
            mode: CommandMode::Voltage,
            voltage_setpoint: 0.0,
            torque_setpoint: 0.0,
            torque_control_enabled: false,
            fets_enabled: false,
            safe_torque_off: false,
            brake: false,
            torque_actual: 0.0,
            q_voltage: 0.0,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &MotorcontrolConfig {
        &self.config
    }

    /// Replace the configuration. The torque loop restarts and the torque
    /// ceiling is re-clamped to the new maximum.
    pub fn set_config(&mut self, config: MotorcontrolConfig) {
        self.torque_pid = PidController::new(config.torque_pid);
        self.torque_max = self.torque_max.min(f64::from(config.max_torque));
        self.torque_setpoint = saturate(self.torque_setpoint, self.torque_max);
        self.config = config;
    }

    /// Replace only the torque PID parameters.
    pub fn set_torque_pid(&mut self, pid: PidConfig) {
        self.config.torque_pid = pid;
        self.torque_pid.set_config(pid);
    }

    /// Current command mode.
    #[must_use]
    pub fn mode(&self) -> CommandMode {
        self.mode
    }

    /// Command an open loop q-axis voltage, saturated at full scale.
    pub fn set_voltage(&mut self, voltage: f64) {
        self.mode = CommandMode::Voltage;
        self.voltage_setpoint = saturate(voltage, f64::from(VOLTAGE_FULL_SCALE));
    }

    /// Command a torque in mNm, clamped to the torque ceiling.
    pub fn set_torque(&mut self, torque: f64) {
        if self.mode != CommandMode::Torque {
            self.torque_pid.reset();
        }
        self.mode = CommandMode::Torque;
        self.torque_setpoint = saturate(torque, self.torque_max);
    }

    /// Torque setpoint in mNm.
    #[must_use]
    pub fn torque_setpoint(&self) -> f64 {
        self.torque_setpoint
    }

    /// Lower (or restore) the torque ceiling; never above the configured
    /// maximum. Returns the ceiling in effect.
    pub fn set_torque_max(&mut self, torque_max: f64) -> f64 {
        self.torque_max = torque_max.abs().min(f64::from(self.config.max_torque));
        self.torque_setpoint = saturate(self.torque_setpoint, self.torque_max);
        self.torque_max
    }

    /// Torque ceiling in mNm.
    #[must_use]
    pub fn torque_max(&self) -> f64 {
        self.torque_max
    }

    /// Torque estimated from the last current measurement, mNm.
    #[must_use]
    pub fn torque_actual(&self) -> f64 {
        self.torque_actual
    }

    /// q-axis voltage applied in the last step.
    #[must_use]
    pub fn q_voltage(&self) -> f64 {
        self.q_voltage
    }

    /// Enable or disable the torque PID. While disabled the torque mode
    /// commands zero voltage.
    pub fn set_torque_control_enabled(&mut self, enabled: bool) {
        if enabled && !self.torque_control_enabled {
            self.torque_pid.reset();
        }
        self.torque_control_enabled = enabled;
    }

    /// Whether the torque PID runs.
    #[must_use]
    pub fn torque_control_enabled(&self) -> bool {
        self.torque_control_enabled
    }

    /// Switch the gate drivers. Enabling clears safe torque off.
    pub fn set_fets_state(&mut self, enabled: bool) {
        if enabled {
            self.safe_torque_off = false;
        }
        self.fets_enabled = enabled;
    }

    /// Gate driver state.
    #[must_use]
    pub fn fets_enabled(&self) -> bool {
        self.fets_enabled
    }

    /// Drop the voltage and torque commands and restart the torque loop.
    pub fn clear_commands(&mut self) {
        self.voltage_setpoint = 0.0;
        self.torque_setpoint = 0.0;
        self.torque_pid.reset();
    }

    /// Force zero output: all commands are dropped and the FETs disabled
    /// until they are explicitly enabled again.
    pub fn safe_torque_off(&mut self) {
        self.safe_torque_off = true;
        self.fets_enabled = false;
        self.clear_commands();
    }

    /// Whether safe torque off is active.
    #[must_use]
    pub fn is_safe_torque_off(&self) -> bool {
        self.safe_torque_off
    }

    /// Engage or release the brake output.
    pub fn set_brake(&mut self, engaged: bool) {
        self.brake = engaged;
    }

    /// Brake output state.
    #[must_use]
    pub fn brake(&self) -> bool {
        self.brake
    }

    /// Commutation angle for `angle`, in electrical radians.
    ///
    /// The clockwise offset is used for non-negative commands, the
    /// counter-clockwise one for negative commands.
    #[must_use]
    pub fn commutation_angle(&self, angle: u32) -> f64 {
        let command = match self.mode {
            CommandMode::Voltage => self.voltage_setpoint,
            CommandMode::Torque => self.torque_setpoint,
        };
        let offset = if command < 0.0 {
            self.config.hall_offset_cclk
        } else {
            self.config.hall_offset_clk
        };
        let theta = electrical_radians(angle.wrapping_add(offset));
        match self.config.winding_type {
            WindingType::Star => theta,
            WindingType::Delta => theta + FRAC_PI_6,
        }
    }

    /// Torque in mNm delivered by the measured phase currents at `theta`.
    #[must_use]
    pub fn measure_torque(&self, phase_current_ma: [i32; 3], theta: f64) -> f64 {
        let currents = phase_current_ma.map(f64::from);
        let iq_ma = match self.config.motor_type {
            MotorType::Bldc => {
                let (alpha, beta) = clarke(currents);
                park(alpha, beta, theta).1
            }
            MotorType::Bdc => {
                let [a, _, _] = currents;
                a
            }
        };
        self.config
            .polarity
            .apply_f64(iq_ma / 1_000.0 * self.config.torque_constant)
    }

    /// Run one commutation period.
    ///
    /// `faulted` is the state of the fault latch; while it is set the output
    /// is off whatever was commanded.
    pub fn step(&mut self, angle: u32, measurements: &PowerMeasurements, faulted: bool) -> PwmOutput {
        let theta = self.commutation_angle(angle);
        self.torque_actual = self.measure_torque(measurements.phase_current_ma, theta);

        if faulted || self.safe_torque_off || !self.fets_enabled {
            self.torque_pid.reset();
            self.q_voltage = 0.0;
            return PwmOutput::off(self.brake);
        }

        let command = match self.mode {
            CommandMode::Voltage => self.voltage_setpoint,
            CommandMode::Torque if self.torque_control_enabled => {
                self.torque_pid.update(self.torque_setpoint, self.torque_actual)
            }
            CommandMode::Torque => 0.0,
        };
        self.q_voltage = self.config.polarity.apply_f64(command);

        let phases = match self.config.motor_type {
            MotorType::Bldc => {
                let (alpha, beta) = inverse_park(0.0, self.q_voltage, theta);
                inverse_clarke(alpha, beta)
            }
            MotorType::Bdc => [self.q_voltage / 2.0, -self.q_voltage / 2.0, 0.0],
        };
        modulate(phases, self.config.pwm_max, self.config.dead_time, self.brake)
    }
}
