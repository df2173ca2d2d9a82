use accel_duty::runtime::{resting_signal, shaking_signal};
use accel_duty::{
    DEFAULT_READ_INTERVAL_MS, DEFAULT_WARMUP_INTERVAL_MS, DutyCycleRuntime, MIN_SLEEP_INTERVAL_MS,
    RuntimeOptions, SamplingRate, SchedulerConfig,
};
use clap::Parser;
use spdlog::prelude::*;
use std::time::{Duration, Instant};

/// Runs the duty cycle against a simulated accelerometer and logs each window.
#[derive(Parser)]
struct Args {
    /// Sampling rate code: 0 fastest, 1 game, 2 ui, 3 normal.
    #[arg(long, default_value_t = 1)]
    rate: i32,
    #[arg(long, default_value_t = MIN_SLEEP_INTERVAL_MS)]
    interval_ms: i64,
    #[arg(long, default_value_t = DEFAULT_READ_INTERVAL_MS)]
    read_ms: i64,
    #[arg(long, default_value_t = DEFAULT_WARMUP_INTERVAL_MS)]
    warmup_ms: i64,
    /// Work limit in samples. Unlimited when absent.
    #[arg(long)]
    limit: Option<f64>,
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,
    /// Shake the simulated device at this frequency in Hz.
    #[arg(long)]
    shake_hz: Option<f64>,
    #[arg(long)]
    latency_stats: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = SchedulerConfig::default();
    config.apply_rate(args.rate);
    config.apply_sleep_interval(args.interval_ms);
    config.apply_read_interval(args.read_ms);
    config.apply_warmup_interval(args.warmup_ms);
    info!(
        "[System] Booting duty cycle: rate {}, every {}ms, warm-up {}ms, read {}ms",
        config.rate, config.sleep_interval_ms, config.warmup_interval_ms, config.read_interval_ms
    );

    let signal = match args.shake_hz {
        Some(hz) => shaking_signal(hz, 1.5),
        None => resting_signal(),
    };
    let runtime = DutyCycleRuntime::start(RuntimeOptions {
        config,
        enable_latency_stats: args.latency_stats,
        signal,
    })?;
    let service = runtime.service();
    if let Some(limit) = args.limit {
        service.set_work_limit(limit);
    }
    service.start();

    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);
    let mut previous = service.last_window();
    while Instant::now() < deadline {
        let Some(window) = runtime.await_window(&previous, Duration::from_millis(250)) else {
            continue;
        };
        info!(
            "Window of {} samples (rate {}), mean force {:.3}g, last at {:?}ms, significant: {}",
            window.len(),
            SamplingRate::from_code(args.rate),
            window.mean_force().unwrap_or(0.0),
            window.last_timestamp(),
            service.significant_force(1.1),
        );
        previous = window;
    }

    service.stop();
    info!(
        "[System] Done. Total work: {}, budget left: {}",
        service.total_work(),
        service.has_budget()
    );
    Ok(())
}
