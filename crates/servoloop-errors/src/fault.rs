//! Protection fault codes.
//!
//! A [`FaultCode`] is what the fault latch stores. Once a code other than
//! [`FaultCode::NoFault`] is latched the drive outputs stay disabled until the
//! latch is explicitly cleared, regardless of whether the triggering condition
//! has gone away.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::common::ErrorSeverity;

/// Latched protection fault.
///
/// The numeric codes of the first eight variants are the ones reported in
/// upstream status words and must stay stable.
///
/// # Examples
///
/// ```
/// use servoloop_errors::FaultCode;
///
/// let fault = FaultCode::OverCurrentPhaseA;
/// assert_eq!(fault.code(), 1);
/// assert!(fault.is_fault());
/// assert_eq!(FaultCode::from_code(5), Some(FaultCode::OverVoltage));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FaultCode {
    /// No fault latched
    #[default]
    NoFault = 0,
    /// Over-current detected on phase A
    OverCurrentPhaseA = 1,
    /// Over-current detected on phase B
    OverCurrentPhaseB = 2,
    /// Over-current detected on phase C
    OverCurrentPhaseC = 3,
    /// DC bus voltage below the configured minimum
    UnderVoltage = 4,
    /// DC bus voltage above the configured maximum
    OverVoltage = 5,
    /// Licence check failed
    WrongLicence = 6,
    /// Reference clock frequency does not match the configuration
    WrongRefClkFrq = 7,
    /// Position sensor unavailable for longer than the allowed number of cycles
    SensorUnavailable = 8,
    /// A periodic task overran its period
    DeadlineMissed = 9,
    /// Commutation heartbeat not seen within the watchdog timeout
    WatchdogTimeout = 10,
}

impl FaultCode {
    /// All variants in code order.
    pub const ALL: [FaultCode; 11] = [
        FaultCode::NoFault,
        FaultCode::OverCurrentPhaseA,
        FaultCode::OverCurrentPhaseB,
        FaultCode::OverCurrentPhaseC,
        FaultCode::UnderVoltage,
        FaultCode::OverVoltage,
        FaultCode::WrongLicence,
        FaultCode::WrongRefClkFrq,
        FaultCode::SensorUnavailable,
        FaultCode::DeadlineMissed,
        FaultCode::WatchdogTimeout,
    ];

    /// Get the numeric fault code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Create a fault from its numeric code.
    ///
    /// Returns `None` if the code does not correspond to a known fault.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|fault| fault.code() == code)
    }

    /// `true` for every variant except [`FaultCode::NoFault`].
    pub fn is_fault(self) -> bool {
        self != FaultCode::NoFault
    }

    /// Over-current fault for a phase index (0 = A, 1 = B, 2 = C).
    pub fn over_current(phase: usize) -> Option<Self> {
        match phase {
            0 => Some(FaultCode::OverCurrentPhaseA),
            1 => Some(FaultCode::OverCurrentPhaseB),
            2 => Some(FaultCode::OverCurrentPhaseC),
            _ => None,
        }
    }

    /// Get the fault severity.
    pub fn severity(self) -> ErrorSeverity {
        match self {
            FaultCode::NoFault => ErrorSeverity::Info,
            FaultCode::WrongLicence | FaultCode::WrongRefClkFrq => ErrorSeverity::Error,
            _ => ErrorSeverity::Critical,
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCode::NoFault => write!(f, "No fault"),
            FaultCode::OverCurrentPhaseA => write!(f, "Over-current on phase A"),
            FaultCode::OverCurrentPhaseB => write!(f, "Over-current on phase B"),
            FaultCode::OverCurrentPhaseC => write!(f, "Over-current on phase C"),
            FaultCode::UnderVoltage => write!(f, "DC bus under-voltage"),
            FaultCode::OverVoltage => write!(f, "DC bus over-voltage"),
            FaultCode::WrongLicence => write!(f, "Wrong licence"),
            FaultCode::WrongRefClkFrq => write!(f, "Wrong reference clock frequency"),
            FaultCode::SensorUnavailable => write!(f, "Position sensor unavailable"),
            FaultCode::DeadlineMissed => write!(f, "Periodic task deadline missed"),
            FaultCode::WatchdogTimeout => write!(f, "Watchdog heartbeat timeout"),
        }
    }
}

impl std::error::Error for FaultCode {}
