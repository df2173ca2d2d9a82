use crate::config::{SamplingRate, SchedulerConfig};
use crate::ports::{
    AdaptiveApplication, PowerMonitor, SensorSource, TimerFacility, WakeHold, WakeSource,
};
use crate::sample::RawSample;
use crate::scheduler::{DutyCycle, Effect, Effects, Event, Phase, SampleOutcome, TimerToken};
use crate::window::WindowSnapshot;
use spdlog::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub const APP_NAME: &str = "AccelService";
pub const ACCEL_UNIT_NAME: &str = "Accel";
/// Budget horizon requested from the power monitor.
pub const DEFAULT_POWER_CYCLE_HORIZON_MS: i64 = 5 * 60 * 1000;

/// The host collaborators the service drives.
pub struct Ports {
    pub sensor: Box<dyn SensorSource>,
    pub timers: Box<dyn TimerFacility>,
    pub wake: Box<dyn WakeSource>,
    pub hold: Box<dyn WakeHold>,
}

impl Ports {
    fn apply(&mut self, effects: Effects) {
        for effect in effects {
            match effect {
                Effect::ArmWakeUps { interval_ms } => self.wake.arm_repeating(interval_ms),
                Effect::CancelWakeUps => self.wake.cancel(),
                Effect::ScheduleTimer { token, delay_ms } => self.timers.schedule(token, delay_ms),
                Effect::CancelTimer(kind) => self.timers.cancel(kind),
                Effect::ActivateSensor(rate) => self.sensor.activate(rate),
                Effect::DeactivateSensor => self.sensor.deactivate(),
                Effect::AcquireWakeHold => self.hold.acquire(),
                Effect::ReleaseWakeHold => self.hold.release(),
            }
        }
    }
}

/// The monitor the service reports to, and whether it accepted the service.
struct MonitorLink {
    monitor: Arc<dyn PowerMonitor>,
    app: Weak<AccelService>,
    registered: bool,
}

struct ServiceState {
    cycle: DutyCycle,
    ports: Ports,
}

/// Thread-safe front of the duty cycle.
///
/// Client calls, host callbacks and raw samples all serialize on one lock that
/// covers the phase, budget, registry, configuration and the window swap.
pub struct AccelService {
    state: Mutex<ServiceState>,
    monitor: Mutex<Option<MonitorLink>>,
}

impl AccelService {
    pub fn new(config: SchedulerConfig, ports: Ports) -> Self {
        Self {
            state: Mutex::new(ServiceState {
                cycle: DutyCycle::new(config),
                ports,
            }),
            monitor: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, event: Event) -> bool {
        let mut state = self.lock();
        let effects = state.cycle.handle(event);
        let changed = !effects.is_empty();
        state.ports.apply(effects);
        changed
    }

    /// Registers a consumer. Returns true if this call started the duty cycle.
    pub fn start(&self) -> bool {
        self.dispatch(Event::Start)
    }

    /// Releases a consumer. Returns true if this call stopped the duty cycle.
    pub fn stop(&self) -> bool {
        self.dispatch(Event::Stop)
    }

    /// Tears everything down regardless of how many consumers remain, and
    /// leaves the power monitor.
    pub fn shutdown(&self) {
        self.dispatch(Event::Shutdown);
        self.disconnect_power_monitor();
    }

    /// Callback for the periodic wake-up. A monitor that refused the service
    /// earlier is asked again first.
    pub fn on_wake_up(&self) {
        self.rebind_power_monitor();
        self.dispatch(Event::WakeUp);
    }

    /// Callback for a one-shot timer.
    pub fn on_timer(&self, token: TimerToken) {
        self.dispatch(Event::TimerFired(token));
    }

    /// Callback for each raw sample from the driver.
    #[inline(always)]
    pub fn on_sample(&self, raw: RawSample, timestamp_ms: i64) -> SampleOutcome {
        self.lock().cycle.on_sample(raw, timestamp_ms)
    }

    pub fn suggest_rate(&self, code: i32) -> SamplingRate {
        info!("Got rate suggestion of {}", code);
        self.lock().cycle.suggest_rate(code)
    }

    pub fn suggest_interval(&self, interval_ms: i64) -> i64 {
        info!("Got interval suggestion of {}", interval_ms);
        let mut state = self.lock();
        let (applied, effects) = state.cycle.suggest_interval(interval_ms);
        state.ports.apply(effects);
        applied
    }

    pub fn set_reading_length(&self, length_ms: i64) -> i64 {
        self.lock().cycle.set_reading_length(length_ms)
    }

    pub fn set_warmup_length(&self, length_ms: i64) -> i64 {
        self.lock().cycle.set_warmup_length(length_ms)
    }

    /// Restores the default rate, interval and reading length.
    ///
    /// The wake-up cadence is re-armed only when the interval changes while running.
    pub fn reset_to_default(&self) {
        info!("Resetting variables to default");
        let mut state = self.lock();
        let effects = state.cycle.reset_to_default();
        state.ports.apply(effects);
    }

    pub fn interval(&self) -> i64 {
        self.lock().cycle.config().sleep_interval_ms
    }

    pub fn rate(&self) -> SamplingRate {
        self.lock().cycle.config().rate
    }

    pub fn reading_length(&self) -> i64 {
        self.lock().cycle.config().read_interval_ms
    }

    pub fn warmup_length(&self) -> i64 {
        self.lock().cycle.config().warmup_interval_ms
    }

    /// The last completed window. Empty until a cycle has finished.
    pub fn last_window(&self) -> WindowSnapshot {
        self.lock().cycle.window().published()
    }

    pub fn last_force(&self) -> Vec<f64> {
        self.last_window().forces()
    }

    pub fn last_x_values(&self) -> Vec<f64> {
        self.last_window().xs()
    }

    pub fn last_y_values(&self) -> Vec<f64> {
        self.last_window().ys()
    }

    pub fn last_z_values(&self) -> Vec<f64> {
        self.last_window().zs()
    }

    /// Whether the mean force of the last window exceeds `threshold`.
    /// With no window yet this answers true.
    pub fn significant_force(&self, threshold: f64) -> bool {
        self.lock().cycle.window().significant_force(threshold)
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.lock().cycle.window().last_timestamp()
    }

    pub fn phase(&self) -> Phase {
        self.lock().cycle.phase()
    }

    pub fn is_running(&self) -> bool {
        self.lock().cycle.is_running()
    }

    pub fn client_count(&self) -> u32 {
        self.lock().cycle.client_count()
    }

    pub fn total_work(&self) -> f64 {
        self.lock().cycle.budget().total()
    }

    pub fn has_budget(&self) -> bool {
        self.lock().cycle.budget().has_budget()
    }

    pub fn set_work_limit(&self, limit: f64) {
        self.lock().cycle.set_work_limit(limit);
    }

    fn monitor_link(&self) -> MutexGuard<'_, Option<MonitorLink>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register_with(monitor: &dyn PowerMonitor, app: Arc<AccelService>) -> bool {
        match monitor.register(app, DEFAULT_POWER_CYCLE_HORIZON_MS) {
            Ok(()) => {
                info!("Registered with power monitor");
                true
            }
            Err(e) => {
                error!("Could not register with power monitor: {}", e);
                false
            }
        }
    }

    /// Registers with the power monitor. Failures are logged and the service keeps
    /// running unbudgeted; registration is retried on each wake-up.
    ///
    /// The monitor keeps the service alive until `disconnect_power_monitor` or
    /// `shutdown`.
    pub fn connect_power_monitor(self: &Arc<Self>, monitor: Arc<dyn PowerMonitor>) {
        let registered = Self::register_with(monitor.as_ref(), self.clone());
        *self.monitor_link() = Some(MonitorLink {
            monitor,
            app: Arc::downgrade(self),
            registered,
        });
    }

    fn rebind_power_monitor(&self) {
        let pending = match self.monitor_link().as_ref() {
            Some(link) if !link.registered => Some((link.monitor.clone(), link.app.clone())),
            _ => None,
        };
        let Some((monitor, app)) = pending else {
            return;
        };
        let Some(app) = app.upgrade() else {
            return;
        };
        info!("Rebinding to power monitor");
        if !Self::register_with(monitor.as_ref(), app) {
            return;
        }
        if let Some(link) = self.monitor_link().as_mut()
            && Arc::ptr_eq(&link.monitor, &monitor)
        {
            link.registered = true;
        }
    }

    pub fn disconnect_power_monitor(&self) {
        let Some(link) = self.monitor_link().take() else {
            return;
        };
        if !link.registered {
            debug!("Power monitor never accepted the service, nothing to unregister");
            return;
        }
        match link.monitor.unregister(APP_NAME) {
            Ok(()) => info!("Unregistered from power monitor"),
            Err(e) => error!("Could not unregister from power monitor: {}", e),
        }
    }

    pub fn is_power_monitor_connected(&self) -> bool {
        self.monitor_link().is_some()
    }

    /// Whether the connected monitor has accepted the service.
    pub fn is_power_monitor_registered(&self) -> bool {
        self.monitor_link()
            .as_ref()
            .is_some_and(|link| link.registered)
    }
}

impl AdaptiveApplication for AccelService {
    fn name(&self) -> String {
        APP_NAME.to_string()
    }

    fn identify_list(&self) -> Vec<String> {
        vec![ACCEL_UNIT_NAME.to_string()]
    }

    fn work(&self) -> Vec<f64> {
        vec![self.total_work()]
    }

    fn set_work_limit(&self, limits: &[f64]) {
        match limits.first() {
            Some(&limit) => AccelService::set_work_limit(self, limit),
            None => warn!("Ignoring empty work limit"),
        }
    }
}
