//! Shared latched fault cell.

use std::sync::Arc;

use portable_atomic::{AtomicU8, Ordering};
use servoloop_errors::FaultCode;

/// Latched fault shared between the watchdog and every output stage.
///
/// Cloning a `FaultLatch` yields another handle to the same cell. The cell
/// holds exactly one [`FaultCode`]; the first fault latched wins and stays
/// until [`FaultLatch::clear`].
///
/// # Real-Time Safety
///
/// `current()` is a single acquire load, `latch()` a single compare-exchange.
#[derive(Debug, Clone, Default)]
pub struct FaultLatch {
    code: Arc<AtomicU8>,
}

impl FaultLatch {
    /// Create a latch with no fault set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch `fault` unless another fault is already latched.
    ///
    /// Returns `true` if this call set the latch. Latching
    /// [`FaultCode::NoFault`] is a no-op.
    pub fn latch(&self, fault: FaultCode) -> bool {
        if !fault.is_fault() {
            return false;
        }
        self.code
            .compare_exchange(
                FaultCode::NoFault.code(),
                fault.code(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Currently latched fault.
    #[must_use]
    pub fn current(&self) -> FaultCode {
        FaultCode::from_code(self.code.load(Ordering::Acquire)).unwrap_or(FaultCode::NoFault)
    }

    /// `true` while any fault is latched.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.current().is_fault()
    }

    /// Clear the latch, returning the fault that was latched.
    pub fn clear(&self) -> FaultCode {
        let previous = self.code.swap(FaultCode::NoFault.code(), Ordering::AcqRel);
        FaultCode::from_code(previous).unwrap_or(FaultCode::NoFault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fault_wins() {
        let latch = FaultLatch::new();
        assert!(latch.latch(FaultCode::UnderVoltage));
        assert!(!latch.latch(FaultCode::OverCurrentPhaseB));
        assert_eq!(latch.current(), FaultCode::UnderVoltage);
    }

    #[test]
    fn test_clones_share_state() {
        let latch = FaultLatch::new();
        let reader = latch.clone();
        latch.latch(FaultCode::OverVoltage);
        assert!(reader.is_faulted());
        assert_eq!(reader.clear(), FaultCode::OverVoltage);
        assert!(!latch.is_faulted());
    }

    #[test]
    fn test_no_fault_does_not_latch() {
        let latch = FaultLatch::new();
        assert!(!latch.latch(FaultCode::NoFault));
        assert!(!latch.is_faulted());
    }
}
