//! Unit tests for the public watchdog API.

use servoloop_watchdog::prelude::*;

mod lifecycle {
    use super::*;

    #[test]
    fn test_start_stop_cycle() -> Result<(), Box<dyn std::error::Error>> {
        let watchdog = Watchdog::new(WatchdogConfig::default());
        assert_eq!(watchdog.status(), WatchdogStatus::Stopped);
        watchdog.start(0)?;
        assert_eq!(watchdog.status(), WatchdogStatus::Running);
        watchdog.stop()?;
        assert_eq!(watchdog.status(), WatchdogStatus::Stopped);
        Ok(())
    }

    #[test]
    fn test_stop_when_stopped_fails() {
        let watchdog = Watchdog::new(WatchdogConfig::default());
        assert!(matches!(
            watchdog.stop(),
            Err(WatchdogError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_stopped_watchdog_does_not_time_out() {
        let watchdog = Watchdog::new(WatchdogConfig::default());
        assert_eq!(watchdog.poll(10_000_000), FaultCode::NoFault);
    }
}

mod protection {
    use super::*;

    #[test]
    fn test_protect_and_reset() -> Result<(), Box<dyn std::error::Error>> {
        let watchdog = Watchdog::new(WatchdogConfig::default());
        watchdog.start(0)?;

        assert!(watchdog.protect(FaultCode::OverCurrentPhaseA));
        assert_eq!(watchdog.status(), WatchdogStatus::Tripped);
        assert!(!watchdog.protect(FaultCode::UnderVoltage));
        assert_eq!(watchdog.latch().current(), FaultCode::OverCurrentPhaseA);

        assert_eq!(watchdog.reset_faults(), FaultCode::OverCurrentPhaseA);
        assert_eq!(watchdog.status(), WatchdogStatus::Running);
        assert_eq!(watchdog.metrics().resets, 1);
        Ok(())
    }

    #[test]
    fn test_protect_no_fault_is_ignored() {
        let watchdog = Watchdog::new(WatchdogConfig::default());
        assert!(!watchdog.protect(FaultCode::NoFault));
        assert_eq!(watchdog.status(), WatchdogStatus::Stopped);
    }

    #[test]
    fn test_latch_visible_from_other_thread() -> Result<(), Box<dyn std::error::Error>> {
        let watchdog = std::sync::Arc::new(Watchdog::new(WatchdogConfig::default()));
        let latch = watchdog.latch().clone();
        let handle = std::thread::spawn(move || latch.is_faulted());
        watchdog.protect(FaultCode::OverVoltage);
        let _seen_before_or_after = handle.join().map_err(|_| "thread panicked")?;
        assert!(watchdog.latch().is_faulted());
        Ok(())
    }
}
