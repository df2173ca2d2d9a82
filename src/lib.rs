mod budget;
mod config;
pub mod measure;
pub mod ports;
mod registry;
pub mod runtime;
mod sample;
mod scheduler;
mod service;
mod window;

pub use crate::budget::BudgetCounter;
pub use crate::config::{
    DEFAULT_READ_INTERVAL_MS, DEFAULT_SLEEP_INTERVAL_MS, DEFAULT_WARMUP_INTERVAL_MS,
    MIN_SLEEP_INTERVAL_MS, SamplingRate, SchedulerConfig,
};
pub use crate::registry::ClientRegistry;
pub use crate::runtime::{DutyCycleRuntime, RuntimeError, RuntimeOptions};
pub use crate::sample::{RawSample, STANDARD_GRAVITY, SamplePoint, force_magnitude};
pub use crate::scheduler::{
    DutyCycle, Effect, Effects, Event, Phase, SampleOutcome, TimerKind, TimerToken,
};
pub use crate::service::{
    ACCEL_UNIT_NAME, APP_NAME, AccelService, DEFAULT_POWER_CYCLE_HORIZON_MS, Ports,
};
pub use crate::window::{MAX_PREALLOC_POINTS, SampleWindow, SnapshotError, WindowSnapshot};
