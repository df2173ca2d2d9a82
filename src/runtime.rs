//! A threaded host for the service: one event thread that owns every timer and
//! the wake-up cadence, plus a simulated accelerometer that pushes samples onto
//! the same event queue while it is active.

use crate::config::{SamplingRate, SchedulerConfig};
use crate::measure::{DispatchKind, DispatchLatency};
use crate::ports::{SensorSource, TimerFacility, WakeHold, WakeSource};
use crate::sample::{RawSample, STANDARD_GRAVITY};
use crate::scheduler::{TimerKind, TimerToken};
use crate::service::{AccelService, Ports};
use crate::window::WindowSnapshot;
use spdlog::{debug, error, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn the {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Acceleration reported by the simulated sensor, given the time since start.
pub type SignalFn = Arc<dyn Fn(Duration) -> RawSample + Send + Sync>;

/// A device lying flat and still.
pub fn resting_signal() -> SignalFn {
    Arc::new(|_| RawSample::new(0.0, 0.0, STANDARD_GRAVITY))
}

/// A device being shaken along x at `hz` with `amplitude_g` peak.
pub fn shaking_signal(hz: f64, amplitude_g: f64) -> SignalFn {
    Arc::new(move |elapsed| {
        let phase = elapsed.as_secs_f64() * hz * std::f64::consts::TAU;
        RawSample::new(
            amplitude_g * STANDARD_GRAVITY * phase.sin(),
            0.0,
            STANDARD_GRAVITY,
        )
    })
}

pub struct RuntimeOptions {
    pub config: SchedulerConfig,
    pub enable_latency_stats: bool,
    pub signal: SignalFn,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            config: SchedulerConfig::default(),
            enable_latency_stats: false,
            signal: resting_signal(),
        }
    }
}

enum Command {
    Schedule(TimerToken, Duration),
    Cancel(TimerKind),
    ArmWakeUps(Duration),
    CancelWakeUps,
    Sample(RawSample),
    Exit,
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

struct ChannelTimers(Sender<Command>);

impl TimerFacility for ChannelTimers {
    fn schedule(&mut self, token: TimerToken, delay_ms: i64) {
        let _ = self.0.send(Command::Schedule(token, millis(delay_ms)));
    }

    fn cancel(&mut self, kind: TimerKind) {
        let _ = self.0.send(Command::Cancel(kind));
    }
}

struct ChannelWakeSource(Sender<Command>);

impl WakeSource for ChannelWakeSource {
    fn arm_repeating(&mut self, interval_ms: i64) {
        let _ = self.0.send(Command::ArmWakeUps(millis(interval_ms)));
    }

    fn cancel(&mut self) {
        let _ = self.0.send(Command::CancelWakeUps);
    }
}

struct CountingWakeHold(Arc<AtomicI64>);

impl WakeHold for CountingWakeHold {
    fn acquire(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Emits `signal` samples at the rate's nominal period while active. Each
/// activation gets its own flag so a stale generator thread never outlives its
/// deactivation by more than one period.
struct SimulatedSensor {
    tx: Sender<Command>,
    signal: SignalFn,
    epoch: Instant,
    active: Option<Arc<AtomicBool>>,
    activations: Arc<AtomicU64>,
}

impl SensorSource for SimulatedSensor {
    fn activate(&mut self, rate: SamplingRate) {
        if self.active.is_some() {
            return;
        }
        let flag = Arc::new(AtomicBool::new(true));
        let thread_flag = flag.clone();
        let tx = self.tx.clone();
        let signal = self.signal.clone();
        let epoch = self.epoch;
        let period = rate.nominal_period();

        let spawned = thread::Builder::new()
            .name("accel-duty-sensor".into())
            .spawn(move || {
                loop {
                    thread::sleep(period);
                    if !thread_flag.load(Ordering::Acquire) {
                        break;
                    }
                    if tx.send(Command::Sample(signal(epoch.elapsed()))).is_err() {
                        break;
                    }
                }
            });
        match spawned {
            Ok(_) => {
                debug!("Sensor activated at {}", rate);
                self.activations.fetch_add(1, Ordering::Relaxed);
                self.active = Some(flag);
            }
            Err(e) => error!("Could not start the sensor thread: {}", e),
        }
    }

    fn deactivate(&mut self) {
        if let Some(flag) = self.active.take() {
            flag.store(false, Ordering::Release);
            debug!("Sensor deactivated");
        }
    }
}

struct EventLoop {
    service: Arc<AccelService>,
    epoch: Instant,
    wake: Option<(Instant, Duration)>,
    timers: Vec<(Instant, TimerToken)>,
    latency: Option<DispatchLatency>,
}

impl EventLoop {
    fn run(mut self, rx: Receiver<Command>) {
        loop {
            self.fire_due(Instant::now());

            let received = match self.next_deadline() {
                Some(deadline) => {
                    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            let command = match received {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match command {
                Command::Schedule(token, delay) => {
                    self.timers.retain(|(_, t)| t.kind != token.kind);
                    match Instant::now().checked_add(delay) {
                        Some(at) => self.timers.push((at, token)),
                        None => debug!("{:?} timer lies beyond the clock, never fires", token.kind),
                    }
                }
                Command::Cancel(kind) => self.timers.retain(|(_, t)| t.kind != kind),
                Command::ArmWakeUps(interval) => self.wake = Some((Instant::now(), interval)),
                Command::CancelWakeUps => self.wake = None,
                Command::Sample(raw) => {
                    let timestamp_ms = self.epoch.elapsed().as_millis() as i64;
                    self.dispatch(DispatchKind::Sample, |service| {
                        service.on_sample(raw, timestamp_ms);
                    });
                }
                Command::Exit => break,
            }
        }

        if let Some(latency) = &self.latency {
            info!("[Latency/Events]{}", latency.format_stats());
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let timer = self.timers.iter().map(|(at, _)| *at).min();
        let wake = self.wake.map(|(at, _)| at);
        match (timer, wake) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn fire_due(&mut self, now: Instant) {
        if let Some((next, interval)) = self.wake
            && next <= now
        {
            // Missed periods collapse into one wake-up.
            let mut following = next.checked_add(interval);
            while let Some(at) = following
                && at <= now
                && !interval.is_zero()
            {
                following = at.checked_add(interval);
            }
            self.wake = following.map(|at| (at, interval));
            self.dispatch(DispatchKind::WakeUp, |service| service.on_wake_up());
        }

        let mut due: Vec<(Instant, TimerToken)> = Vec::new();
        self.timers.retain(|&(at, token)| {
            if at <= now {
                due.push((at, token));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        for (_, token) in due {
            self.dispatch(DispatchKind::Timer, |service| service.on_timer(token));
        }
    }

    fn dispatch(&mut self, kind: DispatchKind, f: impl FnOnce(&AccelService)) {
        let started = Instant::now();
        f(&self.service);
        if let Some(latency) = self.latency.as_mut() {
            latency.measure(kind, started.elapsed());
        }
    }
}

/// Owns the service and the event thread. Dropping it shuts the service down and
/// joins the thread.
pub struct DutyCycleRuntime {
    service: Arc<AccelService>,
    tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
    wake_holds: Arc<AtomicI64>,
    activations: Arc<AtomicU64>,
}

impl DutyCycleRuntime {
    pub fn start(options: RuntimeOptions) -> Result<Self, RuntimeError> {
        let (tx, rx) = mpsc::channel();
        let epoch = Instant::now();
        let wake_holds = Arc::new(AtomicI64::new(0));
        let activations = Arc::new(AtomicU64::new(0));

        let ports = Ports {
            sensor: Box::new(SimulatedSensor {
                tx: tx.clone(),
                signal: options.signal,
                epoch,
                active: None,
                activations: activations.clone(),
            }),
            timers: Box::new(ChannelTimers(tx.clone())),
            wake: Box::new(ChannelWakeSource(tx.clone())),
            hold: Box::new(CountingWakeHold(wake_holds.clone())),
        };
        let service = Arc::new(AccelService::new(options.config, ports));

        let event_loop = EventLoop {
            service: service.clone(),
            epoch,
            wake: None,
            timers: Vec::new(),
            latency: options
                .enable_latency_stats
                .then(|| DispatchLatency::new(100)),
        };
        let worker = thread::Builder::new()
            .name("accel-duty-events".into())
            .spawn(move || event_loop.run(rx))
            .map_err(|source| RuntimeError::Spawn {
                name: "event",
                source,
            })?;

        info!("[System] Duty-cycle runtime started");
        Ok(Self {
            service,
            tx,
            worker: Some(worker),
            wake_holds,
            activations,
        })
    }

    pub fn service(&self) -> &Arc<AccelService> {
        &self.service
    }

    /// Wake holds currently outstanding.
    pub fn wake_holds(&self) -> i64 {
        self.wake_holds.load(Ordering::Relaxed)
    }

    /// How many times the sensor has been switched on.
    pub fn sensor_activations(&self) -> u64 {
        self.activations.load(Ordering::Relaxed)
    }

    /// Polls until a window other than `previous` is published.
    pub fn await_window(
        &self,
        previous: &WindowSnapshot,
        timeout: Duration,
    ) -> Option<WindowSnapshot> {
        let start = Instant::now();
        loop {
            let current = self.service.last_window();
            if !current.same_window(previous) {
                return Some(current);
            }
            if start.elapsed() > timeout {
                return None;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for DutyCycleRuntime {
    fn drop(&mut self) {
        self.service.shutdown();
        let _ = self.tx.send(Command::Exit);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        info!("[System] Duty-cycle runtime stopped");
    }
}
