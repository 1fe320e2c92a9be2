//! Heartbeat and protection-limit supervision.

use portable_atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use servoloop_errors::FaultCode;
use tracing::{error, info, warn};

use crate::config::WatchdogConfig;
use crate::error::WatchdogResult;
use crate::latch::FaultLatch;
use crate::state::{WatchdogMetrics, WatchdogState, WatchdogStatus};

/// Sentinel for "no heartbeat seen since (re)start".
const AWAITING_HEARTBEAT: u64 = u64::MAX;

/// One sample of the power-stage measurements the watchdog protects against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PowerMeasurements {
    /// Phase currents A, B, C in mA.
    pub phase_current_ma: [i32; 3],
    /// DC bus voltage in mV.
    pub dc_voltage_mv: u32,
    /// Power stage temperature in degrees Celsius.
    pub temperature_c: i32,
}

/// Fault supervisor.
///
/// Shared by reference (`Arc<Watchdog>`) between the commutation task, which
/// sends heartbeats and measurements, and any caller that needs to `protect`
/// or `reset_faults`. Every output stage holds a clone of [`Watchdog::latch`]
/// and forces its output to zero while a fault is latched.
#[derive(Debug)]
pub struct Watchdog {
    config: WatchdogConfig,
    state: WatchdogState,
    latch: FaultLatch,
    last_heartbeat_us: AtomicU64,
}

impl Watchdog {
    /// Create a watchdog with its own fault latch.
    #[must_use]
    pub fn new(config: WatchdogConfig) -> Self {
        Self::with_latch(config, FaultLatch::new())
    }

    /// Create a watchdog supervising an existing fault latch.
    #[must_use]
    pub fn with_latch(config: WatchdogConfig, latch: FaultLatch) -> Self {
        Self {
            config,
            state: WatchdogState::new(),
            latch,
            last_heartbeat_us: AtomicU64::new(AWAITING_HEARTBEAT),
        }
    }

    /// Handle to the shared fault latch.
    #[must_use]
    pub fn latch(&self) -> &FaultLatch {
        &self.latch
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> WatchdogStatus {
        self.state.status()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn metrics(&self) -> WatchdogMetrics {
        self.state.metrics()
    }

    /// Start supervising.
    ///
    /// # Errors
    ///
    /// Returns an error if the watchdog is not stopped.
    pub fn start(&self, now_us: u64) -> WatchdogResult<()> {
        self.state.start()?;
        self.last_heartbeat_us.store(now_us, Ordering::Release);
        info!(timeout_us = self.config.heartbeat_timeout_us, "Watchdog started");
        Ok(())
    }

    /// Stop supervising. A latched fault stays latched.
    ///
    /// # Errors
    ///
    /// Returns an error if the watchdog is not running.
    pub fn stop(&self) -> WatchdogResult<()> {
        self.state.stop()?;
        info!("Watchdog stopped");
        Ok(())
    }

    /// Record a heartbeat from the commutation task.
    pub fn heartbeat(&self, now_us: u64) {
        if self.state.status() != WatchdogStatus::Running {
            return;
        }
        let previous = self.last_heartbeat_us.swap(now_us, Ordering::AcqRel);
        if previous != AWAITING_HEARTBEAT {
            self.state.record_heartbeat(now_us.saturating_sub(previous));
        }
    }

    /// Check the heartbeat deadline and synchronise with the latch.
    ///
    /// Returns the currently latched fault.
    pub fn poll(&self, now_us: u64) -> FaultCode {
        if self.latch.is_faulted() && self.state.status() != WatchdogStatus::Tripped {
            self.state.trip();
        }
        if self.state.status() == WatchdogStatus::Running {
            let last = self.last_heartbeat_us.load(Ordering::Acquire);
            if last == AWAITING_HEARTBEAT {
                self.last_heartbeat_us.store(now_us, Ordering::Release);
            } else if now_us.saturating_sub(last) > u64::from(self.config.heartbeat_timeout_us) {
                warn!(
                    elapsed_us = now_us.saturating_sub(last),
                    "Commutation heartbeat missed"
                );
                self.protect(FaultCode::WatchdogTimeout);
            }
        }
        self.latch.current()
    }

    /// Check one sample of power-stage measurements against the protection
    /// limits, latching the first violated limit.
    ///
    /// Phase over-current is checked before bus voltage. Limits are only
    /// enforced while the watchdog is running.
    pub fn check_protection(&self, measurements: &PowerMeasurements) -> FaultCode {
        if self.state.status() != WatchdogStatus::Running {
            return FaultCode::NoFault;
        }
        let limits = &self.config.protection;
        let over_current = measurements
            .phase_current_ma
            .iter()
            .position(|current| current.saturating_abs() > limits.max_phase_current_ma)
            .and_then(FaultCode::over_current);

        let fault = match over_current {
            Some(fault) => fault,
            None if measurements.dc_voltage_mv < limits.min_dc_voltage_mv => FaultCode::UnderVoltage,
            None if measurements.dc_voltage_mv > limits.max_dc_voltage_mv => FaultCode::OverVoltage,
            None => FaultCode::NoFault,
        };
        if fault.is_fault() {
            self.protect(fault);
        }
        fault
    }

    /// Latch `fault` and force the safe state.
    ///
    /// Returns `true` if this call latched the fault (an earlier fault is
    /// never overwritten).
    pub fn protect(&self, fault: FaultCode) -> bool {
        if !fault.is_fault() {
            return false;
        }
        let latched = self.latch.latch(fault);
        self.state.trip();
        if latched {
            error!(fault = %fault, code = fault.code(), "Fault latched, outputs disabled");
        }
        latched
    }

    /// Clear the latched fault and leave the tripped state.
    ///
    /// The caller is responsible for making sure the physical condition has
    /// gone away; the next protection check will trip again otherwise.
    /// Returns the fault that was cleared.
    pub fn reset_faults(&self) -> FaultCode {
        let cleared = self.latch.clear();
        self.last_heartbeat_us
            .store(AWAITING_HEARTBEAT, Ordering::Release);
        let status = self.state.reset();
        if cleared.is_fault() {
            info!(fault = %cleared, status = %status, "Faults reset");
        }
        cleared
    }
}
