//! Property-based tests for fault latching and protection limits.

use proptest::prelude::*;
use servoloop_watchdog::prelude::*;

fn any_fault() -> impl Strategy<Value = FaultCode> {
    (1u8..=10).prop_map(|code| FaultCode::from_code(code).unwrap_or(FaultCode::UnderVoltage))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_first_fault_wins(faults in proptest::collection::vec(any_fault(), 1..20)) {
        let watchdog = Watchdog::new(WatchdogConfig::default());
        for fault in &faults {
            watchdog.protect(*fault);
        }
        prop_assert_eq!(Some(watchdog.latch().current()), faults.first().copied());
    }

    #[test]
    fn prop_currents_within_limit_never_trip(
        a in -10_000i32..=10_000,
        b in -10_000i32..=10_000,
        c in -10_000i32..=10_000,
        v in 10_000u32..=60_000,
    ) {
        let watchdog = Watchdog::new(WatchdogConfig::default());
        prop_assert!(watchdog.start(0).is_ok());
        let sample = PowerMeasurements {
            phase_current_ma: [a, b, c],
            dc_voltage_mv: v,
            temperature_c: 25,
        };
        prop_assert_eq!(watchdog.check_protection(&sample), FaultCode::NoFault);
        prop_assert!(!watchdog.latch().is_faulted());
    }

    #[test]
    fn prop_latch_holds_until_reset(fault in any_fault(), polls in 1usize..50) {
        let watchdog = Watchdog::new(WatchdogConfig::default());
        watchdog.protect(fault);
        for i in 0..polls {
            prop_assert_eq!(watchdog.poll(i as u64), fault);
        }
        watchdog.reset_faults();
        prop_assert!(!watchdog.latch().is_faulted());
    }
}
