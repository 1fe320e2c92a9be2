//! Motorcontrol operations used by motion control.

use servoloop_errors::FaultCode;
use servoloop_motorcontrol::{MotorcontrolClient, MotorcontrolResult, UpstreamControlData};

/// The subset of the motorcontrol interface motion control drives.
///
/// Implemented by [`MotorcontrolClient`]; tests substitute an in-process
/// motor model.
pub trait TorqueActuator: Send + 'static {
    /// Command a torque in mNm.
    fn set_torque(&self, torque: f64) -> MotorcontrolResult<()>;

    /// Run or stop the torque loop.
    fn set_torque_control_enabled(&self, enabled: bool) -> MotorcontrolResult<()>;

    /// Engage or release the holding brake.
    fn set_brake_status(&self, engaged: bool) -> MotorcontrolResult<()>;

    /// Clear the latched fault and return it.
    fn reset_faults(&self) -> MotorcontrolResult<FaultCode>;

    /// Measurement snapshot.
    fn update_upstream_control_data(&self) -> MotorcontrolResult<UpstreamControlData>;
}

impl TorqueActuator for MotorcontrolClient {
    fn set_torque(&self, torque: f64) -> MotorcontrolResult<()> {
        MotorcontrolClient::set_torque(self, torque)
    }

    fn set_torque_control_enabled(&self, enabled: bool) -> MotorcontrolResult<()> {
        MotorcontrolClient::set_torque_control_enabled(self, enabled)
    }

    fn set_brake_status(&self, engaged: bool) -> MotorcontrolResult<()> {
        MotorcontrolClient::set_brake_status(self, engaged)
    }

    fn reset_faults(&self) -> MotorcontrolResult<FaultCode> {
        MotorcontrolClient::reset_faults(self)
    }

    fn update_upstream_control_data(&self) -> MotorcontrolResult<UpstreamControlData> {
        MotorcontrolClient::update_upstream_control_data(self)
    }
}
