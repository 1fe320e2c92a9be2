//! Power stage abstraction.

use servoloop_watchdog::PowerMeasurements;

use crate::foc::PwmOutput;

/// Gate drivers and current/voltage sensing of one inverter.
///
/// Called from the commutation task only; implementations must not block.
pub trait PowerStage: Send {
    /// Load the gate timings for the next PWM period.
    fn apply(&mut self, output: &PwmOutput);

    /// Sample phase currents, DC bus voltage and temperature.
    fn read_measurements(&mut self) -> PowerMeasurements;
}

impl<S: PowerStage + ?Sized> PowerStage for Box<S> {
    fn apply(&mut self, output: &PwmOutput) {
        (**self).apply(output);
    }

    fn read_measurements(&mut self) -> PowerMeasurements {
        (**self).read_measurements()
    }
}
