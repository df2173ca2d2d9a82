//! Narrow interfaces to what the host provides around the scheduler.
//!
//! Implementations are invoked while the service lock is held, so they must
//! return promptly and must not call back into the service on the same thread.

use crate::config::SamplingRate;
use crate::scheduler::{TimerKind, TimerToken};
use std::sync::Arc;
use thiserror::Error;

/// The raw accelerometer driver.
pub trait SensorSource: Send {
    /// Begins pushing samples at roughly `rate` until `deactivate`.
    fn activate(&mut self, rate: SamplingRate);
    fn deactivate(&mut self);
}

/// One-shot timers, cancellable by kind.
pub trait TimerFacility: Send {
    /// Delivers `token` back to the service after `delay_ms`.
    fn schedule(&mut self, token: TimerToken, delay_ms: i64);
    fn cancel(&mut self, kind: TimerKind);
}

/// The repeating, wake-capable trigger that starts each cycle.
pub trait WakeSource: Send {
    /// Fires immediately, then every `interval_ms`, replacing any earlier schedule.
    fn arm_repeating(&mut self, interval_ms: i64);
    fn cancel(&mut self);
}

/// Keeps the device awake between a wake-up and the end of its recording.
pub trait WakeHold: Send {
    fn acquire(&mut self);
    fn release(&mut self);
}

/// No-op hold for hosts that never sleep mid-cycle.
#[derive(Debug, Default)]
pub struct NoWakeHold;

impl WakeHold for NoWakeHold {
    fn acquire(&mut self) {}

    fn release(&mut self) {}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PowerMonitorError {
    #[error("power monitor is not reachable")]
    Unavailable,
    #[error("power monitor rejected {app}: {reason}")]
    Rejected { app: String, reason: String },
}

/// The side of the power-monitor protocol that an application implements.
pub trait AdaptiveApplication: Send + Sync {
    fn name(&self) -> String;
    /// Names of the countable units, one per entry of the work vector.
    fn identify_list(&self) -> Vec<String>;
    /// Lifetime work per unit.
    fn work(&self) -> Vec<f64>;
    /// New limits per unit.
    fn set_work_limit(&self, limits: &[f64]);
}

/// The remote monitor that grants budgets.
pub trait PowerMonitor: Send + Sync {
    fn register(
        &self,
        app: Arc<dyn AdaptiveApplication>,
        horizon_ms: i64,
    ) -> Result<(), PowerMonitorError>;
    fn unregister(&self, app_name: &str) -> Result<(), PowerMonitorError>;
}
