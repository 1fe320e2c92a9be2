//! Safety-hardening tests for the fault supervisor.
//!
//! All tests use `Result<>` return types and avoid `unwrap`/`expect`.

use servoloop_watchdog::prelude::*;

/// A fault condition that disappears must not clear the latch on its own.
#[test]
fn test_fault_persists_after_condition_clears() -> Result<(), Box<dyn std::error::Error>> {
    let watchdog = Watchdog::new(WatchdogConfig::default());
    watchdog.start(0)?;

    let mut sample = PowerMeasurements {
        phase_current_ma: [15_000, 0, 0],
        dc_voltage_mv: 24_000,
        temperature_c: 30,
    };
    assert_eq!(watchdog.check_protection(&sample), FaultCode::OverCurrentPhaseA);

    sample.phase_current_ma = [0, 0, 0];
    for t in 0..100 {
        watchdog.heartbeat(t * 100);
        assert_eq!(watchdog.poll(t * 100), FaultCode::OverCurrentPhaseA);
    }
    Ok(())
}

/// A condition still present after reset trips again on the next check.
#[test]
fn test_reset_with_condition_present_trips_again() -> Result<(), Box<dyn std::error::Error>> {
    let watchdog = Watchdog::new(WatchdogConfig::default());
    watchdog.start(0)?;
    let sample = PowerMeasurements {
        phase_current_ma: [0, 0, 0],
        dc_voltage_mv: 1_000,
        temperature_c: 30,
    };
    watchdog.check_protection(&sample);
    watchdog.reset_faults();
    assert_eq!(watchdog.check_protection(&sample), FaultCode::UnderVoltage);
    assert_eq!(watchdog.metrics().trips, 2);
    Ok(())
}

/// Sensor unavailability escalates through the monitor into the latch.
#[test]
fn test_sensor_monitor_escalation() {
    let watchdog = Watchdog::new(WatchdogConfig::default());
    let mut monitor = SensorMonitor::new(watchdog.config().sensor_timeout_cycles);
    let mut latched = FaultCode::NoFault;
    for _ in 0..=watchdog.config().sensor_timeout_cycles {
        if let Some(fault) = monitor.observe(servoloop_errors::DecodeStatus::NoAck) {
            watchdog.protect(fault);
            latched = watchdog.latch().current();
        }
    }
    assert_eq!(latched, FaultCode::SensorUnavailable);
}
