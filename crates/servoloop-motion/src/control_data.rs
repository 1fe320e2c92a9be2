//! Commands received from the outer caller every cycle.

use serde::{Deserialize, Serialize};

pub use servoloop_motorcontrol::UpstreamControlData;

/// Setpoints for the next cycles, copied in on every exchange.
///
/// Only the field matching the active control mode is used; `offset_torque`
/// is added as feed-forward in position and velocity control.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DownstreamControlData {
    /// Target position in ticks.
    pub position_cmd: i32,
    /// Target velocity in rpm.
    pub velocity_cmd: i32,
    /// Target torque in mNm.
    pub torque_cmd: f64,
    /// Feed-forward torque in mNm.
    pub offset_torque: f64,
}
