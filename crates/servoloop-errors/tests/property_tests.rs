//! Property-based tests for error codes and classification.

use proptest::prelude::*;
use servoloop_errors::{DecodeStatus, ErrorSeverity, FaultCode, RTError, ServoError};

proptest! {
    #[test]
    fn test_fault_code_roundtrip(code in any::<u8>()) {
        match FaultCode::from_code(code) {
            Some(fault) => prop_assert_eq!(fault.code(), code),
            None => prop_assert!(code > 10),
        }
    }

    #[test]
    fn test_rt_error_roundtrip(code in 1u8..=5u8) {
        if let Some(err) = RTError::from_code(code) {
            prop_assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_decode_status_never_critical(code in 0u8..=6u8) {
        if let Some(status) = DecodeStatus::from_code(code) {
            let err = ServoError::from(status);
            prop_assert!(err.severity() < ErrorSeverity::Critical);
        }
    }

    #[test]
    fn test_every_real_fault_is_a_fault(code in 1u8..=10u8) {
        if let Some(fault) = FaultCode::from_code(code) {
            prop_assert!(fault.is_fault());
        }
    }
}
