use crate::budget::BudgetCounter;
use crate::config::{SamplingRate, SchedulerConfig};
use crate::registry::ClientRegistry;
use crate::sample::{RawSample, SamplePoint};
use crate::window::SampleWindow;
use spdlog::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Sleeping,
    WarmingUp,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Ends the warm-up and opens the recording window.
    Warmup,
    /// Ends the recording window.
    Read,
}

/// Identifies a one-shot timer request. A token whose generation no longer
/// matches the scheduler's is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
    /// Host teardown: drops every client at once.
    Shutdown,
    /// The periodic wake-up fired.
    WakeUp,
    TimerFired(TimerToken),
}

/// A side effect the host must carry out after a transition, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Fire `WakeUp` now and then every `interval_ms`.
    ArmWakeUps { interval_ms: i64 },
    CancelWakeUps,
    ScheduleTimer { token: TimerToken, delay_ms: i64 },
    CancelTimer(TimerKind),
    ActivateSensor(SamplingRate),
    DeactivateSensor,
    AcquireWakeHold,
    ReleaseWakeHold,
}

pub type Effects = Vec<Effect>;

/// What happened to one raw sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOutcome {
    /// Charged against the budget.
    pub charged: bool,
    /// Appended to the active window.
    pub recorded: bool,
}

impl SampleOutcome {
    const DROPPED: SampleOutcome = SampleOutcome {
        charged: false,
        recorded: false,
    };
}

/// Parameters frozen when a cycle is admitted, so negotiation only affects the
/// next cycle.
#[derive(Debug, Clone, Copy)]
struct CyclePlan {
    read_interval_ms: i64,
    rate: SamplingRate,
}

/// The duty-cycle state machine.
///
/// Every transition runs through [`DutyCycle::handle`] and returns the effects
/// the host has to perform; the machine itself never touches hardware or timers.
#[derive(Debug, Default)]
pub struct DutyCycle {
    phase: Phase,
    generation: u64,
    sensor_active: bool,
    wake_hold: bool,
    plan: Option<CyclePlan>,
    budget: BudgetCounter,
    registry: ClientRegistry,
    config: SchedulerConfig,
    window: SampleWindow,
}

impl DutyCycle {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn handle(&mut self, event: Event) -> Effects {
        match event {
            Event::Start => self.on_start(),
            Event::Stop => self.on_stop(),
            Event::Shutdown => self.on_shutdown(),
            Event::WakeUp => self.on_wake_up(),
            Event::TimerFired(token) => self.on_timer(token),
        }
    }

    fn on_start(&mut self) -> Effects {
        let did_start = self.registry.start();
        info!("Client count is {}", self.registry.count());
        if !did_start {
            info!("Already running");
            return vec![];
        }

        info!(
            "Starting duty cycle every {}ms",
            self.config.sleep_interval_ms
        );
        self.phase = Phase::Sleeping;
        vec![Effect::ArmWakeUps {
            interval_ms: self.config.sleep_interval_ms,
        }]
    }

    fn on_stop(&mut self) -> Effects {
        let did_stop = self.registry.stop();
        info!("Client count is {}", self.registry.count());
        if !did_stop {
            return vec![];
        }
        info!("Stopping duty cycle");
        self.tear_down()
    }

    fn on_shutdown(&mut self) -> Effects {
        self.registry.reset();
        info!("Shutting down duty cycle");
        self.tear_down()
    }

    fn tear_down(&mut self) -> Effects {
        // Any timer already queued belongs to a dead generation from here on.
        self.generation += 1;

        let mut effects = vec![
            Effect::CancelWakeUps,
            Effect::CancelTimer(TimerKind::Warmup),
            Effect::CancelTimer(TimerKind::Read),
        ];
        if self.sensor_active {
            self.sensor_active = false;
            effects.push(Effect::DeactivateSensor);
        }
        if self.wake_hold {
            self.wake_hold = false;
            effects.push(Effect::ReleaseWakeHold);
        }
        if let Some(dropped) = self.window.discard_active() {
            debug!("Discarded partial window of {} samples", dropped);
        }
        self.plan = None;
        self.phase = Phase::Idle;
        effects
    }

    fn on_wake_up(&mut self) -> Effects {
        if !self.registry.is_running() {
            warn!("Discarding wake-up while stopped");
            return vec![Effect::CancelWakeUps];
        }

        if self.phase != Phase::Sleeping {
            debug!("Wake-up during {:?}, cycle already in flight", self.phase);
            return vec![];
        }

        if !self.budget.has_budget() {
            info!("Ran out of budget. Did not turn on the sensor.");
            return vec![];
        }

        debug!(
            "Starting to warm up the sensor for {} milliseconds",
            self.config.warmup_interval_ms
        );
        self.generation += 1;
        self.sensor_active = true;
        self.wake_hold = true;
        self.plan = Some(CyclePlan {
            read_interval_ms: self.config.read_interval_ms,
            rate: self.config.rate,
        });
        self.phase = Phase::WarmingUp;

        vec![
            Effect::AcquireWakeHold,
            Effect::ActivateSensor(self.config.rate),
            Effect::ScheduleTimer {
                token: self.token(TimerKind::Warmup),
                delay_ms: self.config.warmup_interval_ms,
            },
        ]
    }

    fn on_timer(&mut self, token: TimerToken) -> Effects {
        if !self.registry.is_running() {
            warn!("Discarding {:?} timer while stopped", token.kind);
            return vec![];
        }
        if token.generation != self.generation {
            warn!(
                "Discarding stale {:?} timer (generation {} != {})",
                token.kind, token.generation, self.generation
            );
            return vec![];
        }

        match (self.phase, token.kind, self.plan) {
            (Phase::WarmingUp, TimerKind::Warmup, Some(plan)) => {
                debug!("Recording the sensor");
                self.window
                    .begin_window_with_capacity(plan.rate.expected_samples(plan.read_interval_ms));
                self.phase = Phase::Recording;
                vec![Effect::ScheduleTimer {
                    token: self.token(TimerKind::Read),
                    delay_ms: plan.read_interval_ms,
                }]
            }
            (Phase::Recording, TimerKind::Read, _) => {
                debug!("Turning off the sensor");
                self.sensor_active = false;
                self.wake_hold = false;
                self.plan = None;
                self.phase = Phase::Sleeping;
                if let Some(recorded) = self.window.publish() {
                    debug!("Recorded {} samples.", recorded);
                }
                vec![Effect::DeactivateSensor, Effect::ReleaseWakeHold]
            }
            (phase, kind, _) => {
                warn!("Discarding {:?} timer during {:?}", kind, phase);
                vec![]
            }
        }
    }

    /// Hot path for every raw sample the driver delivers.
    ///
    /// While the sensor is on each sample is charged; only during `Recording`
    /// is it also appended. A refused charge does not abort the cycle.
    #[inline(always)]
    pub fn on_sample(&mut self, raw: RawSample, timestamp_ms: i64) -> SampleOutcome {
        if !self.sensor_active {
            return SampleOutcome::DROPPED;
        }
        let charged = self.budget.count();
        let recorded = self.phase == Phase::Recording
            && self.window.append(SamplePoint::from_raw(raw, timestamp_ms));
        SampleOutcome { charged, recorded }
    }

    pub fn suggest_rate(&mut self, code: i32) -> SamplingRate {
        let rate = self.config.apply_rate(code);
        info!("Changing rate to {}", rate);
        rate
    }

    /// Applies the clamped interval and, while running, re-arms the wake-up so
    /// the new cadence starts now.
    pub fn suggest_interval(&mut self, requested_ms: i64) -> (i64, Effects) {
        let applied = self.config.apply_sleep_interval(requested_ms);
        info!("Sleeping interval changed to {}", applied);
        if !self.registry.is_running() {
            return (applied, vec![]);
        }
        (
            applied,
            vec![
                Effect::CancelWakeUps,
                Effect::ArmWakeUps {
                    interval_ms: applied,
                },
            ],
        )
    }

    /// Restores the default rate, interval and reading length. The wake-up is
    /// re-armed only when running and the interval actually changed.
    pub fn reset_to_default(&mut self) -> Effects {
        let previous_ms = self.config.sleep_interval_ms;
        self.config.reset_to_default();
        let interval_ms = self.config.sleep_interval_ms;
        info!("Reset to defaults, interval {}ms", interval_ms);
        if !self.registry.is_running() || interval_ms == previous_ms {
            return vec![];
        }
        vec![Effect::CancelWakeUps, Effect::ArmWakeUps { interval_ms }]
    }

    pub fn set_reading_length(&mut self, length_ms: i64) -> i64 {
        let applied = self.config.apply_read_interval(length_ms);
        debug!("Reading length set to {}", applied);
        applied
    }

    pub fn set_warmup_length(&mut self, length_ms: i64) -> i64 {
        let applied = self.config.apply_warmup_interval(length_ms);
        debug!("Warmup length set to {}", applied);
        applied
    }

    /// Installs a new work limit. A cycle already in flight keeps running.
    pub fn set_work_limit(&mut self, limit: f64) {
        self.budget.set_limit(limit);
        info!("Work limit set to {}", limit);
    }

    fn token(&self, kind: TimerKind) -> TimerToken {
        TimerToken {
            kind,
            generation: self.generation,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.registry.is_running()
    }

    pub fn is_sensor_active(&self) -> bool {
        self.sensor_active
    }

    pub fn holds_wake(&self) -> bool {
        self.wake_hold
    }

    pub fn client_count(&self) -> u32 {
        self.registry.count()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn budget(&self) -> &BudgetCounter {
        &self.budget
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }
}
