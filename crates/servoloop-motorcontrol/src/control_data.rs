//! Measurements reported to the motion controller every cycle.

use serde::{Deserialize, Serialize};
use servoloop_errors::{DecodeStatus, FaultCode};

/// Snapshot of the drive state, copied out on every exchange.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UpstreamControlData {
    /// Latched fault, `NoFault` while healthy.
    pub error_status: FaultCode,
    /// Torque computed from the measured q current, mNm.
    pub computed_torque: f64,
    /// Torque setpoint of the torque loop, mNm.
    pub torque_set: f64,
    /// Phase currents in mA.
    pub phase_current_ma: [i32; 3],
    /// DC bus voltage in mV.
    pub v_dc_mv: u32,
    /// Electrical angle.
    pub angle: u32,
    /// Multiturn position count.
    pub position: i32,
    /// Velocity in rpm.
    pub velocity: i32,
    /// Power stage temperature, degrees Celsius.
    pub temperature_c: i32,
    /// Decode status of the position sensor.
    pub sensor_status: DecodeStatus,
}
