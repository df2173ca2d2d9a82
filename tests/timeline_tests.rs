use accel_duty::ports::{SensorSource, TimerFacility, WakeHold, WakeSource};
use accel_duty::{
    AccelService, Phase, Ports, RawSample, STANDARD_GRAVITY, SamplingRate, SchedulerConfig,
    TimerKind, TimerToken,
};
use std::sync::{Arc, Mutex};

const SAMPLE_PERIOD_MS: i64 = 100;

/// Virtual-time host: a single timeline of wake-ups, timers and sensor
/// deliveries, advanced explicitly by the test.
#[derive(Default)]
struct Host {
    now: i64,
    wake: Option<(i64, i64)>,
    timers: Vec<(i64, TimerToken)>,
    sensor_on: bool,
    next_sample_at: i64,
    activations: Vec<i64>,
    deactivations: Vec<i64>,
    holds: i32,
}

type Shared = Arc<Mutex<Host>>;

struct Sensor(Shared);
struct Timers(Shared);
struct Wake(Shared);
struct Hold(Shared);

impl SensorSource for Sensor {
    fn activate(&mut self, _rate: SamplingRate) {
        let mut host = self.0.lock().unwrap();
        let now = host.now;
        host.sensor_on = true;
        host.next_sample_at = now;
        host.activations.push(now);
    }

    fn deactivate(&mut self) {
        let mut host = self.0.lock().unwrap();
        host.sensor_on = false;
        let now = host.now;
        host.deactivations.push(now);
    }
}

impl TimerFacility for Timers {
    fn schedule(&mut self, token: TimerToken, delay_ms: i64) {
        let mut host = self.0.lock().unwrap();
        host.timers.retain(|(_, t)| t.kind != token.kind);
        let at = host.now.saturating_add(delay_ms);
        host.timers.push((at, token));
    }

    fn cancel(&mut self, kind: TimerKind) {
        self.0.lock().unwrap().timers.retain(|(_, t)| t.kind != kind);
    }
}

impl WakeSource for Wake {
    fn arm_repeating(&mut self, interval_ms: i64) {
        let mut host = self.0.lock().unwrap();
        let now = host.now;
        host.wake = Some((now, interval_ms));
    }

    fn cancel(&mut self) {
        self.0.lock().unwrap().wake = None;
    }
}

impl WakeHold for Hold {
    fn acquire(&mut self) {
        self.0.lock().unwrap().holds += 1;
    }

    fn release(&mut self) {
        self.0.lock().unwrap().holds -= 1;
    }
}

enum Due {
    Timer(TimerToken),
    Wake,
    Sample,
}

impl Host {
    /// Pops the earliest occurrence at or before `until`. At equal times timers
    /// go first, then the wake-up, then the sensor.
    fn next_due(&mut self, until: i64) -> Option<(i64, Due)> {
        let mut best: Option<(i64, u8)> = None;
        let mut consider = |at: i64, rank: u8| {
            if at <= until && best.is_none_or(|(t, r)| (at, rank) < (t, r)) {
                best = Some((at, rank));
            }
        };
        if let Some(at) = self.timers.iter().map(|(at, _)| *at).min() {
            consider(at, 0);
        }
        if let Some((at, _)) = self.wake {
            consider(at, 1);
        }
        if self.sensor_on {
            consider(self.next_sample_at, 2);
        }

        let (at, rank) = best?;
        let due = match rank {
            0 => {
                let index = self
                    .timers
                    .iter()
                    .position(|(t, _)| *t == at)
                    .expect("timer present");
                Due::Timer(self.timers.remove(index).1)
            }
            1 => {
                if let Some((next, interval)) = self.wake {
                    self.wake = Some((next.saturating_add(interval), interval));
                }
                Due::Wake
            }
            _ => {
                self.next_sample_at += SAMPLE_PERIOD_MS;
                Due::Sample
            }
        };
        Some((at, due))
    }
}

fn setup(config: SchedulerConfig) -> (AccelService, Shared) {
    let host: Shared = Arc::default();
    let ports = Ports {
        sensor: Box::new(Sensor(host.clone())),
        timers: Box::new(Timers(host.clone())),
        wake: Box::new(Wake(host.clone())),
        hold: Box::new(Hold(host.clone())),
    };
    (AccelService::new(config, ports), host)
}

fn run_until(service: &AccelService, host: &Shared, until: i64) {
    loop {
        let next = {
            let mut h = host.lock().unwrap();
            let next = h.next_due(until);
            match &next {
                Some((at, _)) => h.now = *at,
                None => h.now = until,
            }
            next
        };
        match next {
            Some((_, Due::Timer(token))) => service.on_timer(token),
            Some((_, Due::Wake)) => service.on_wake_up(),
            Some((at, Due::Sample)) => {
                service.on_sample(RawSample::new(0.0, 0.0, STANDARD_GRAVITY), at);
            }
            None => break,
        }
    }
}

fn short_cycle() -> SchedulerConfig {
    SchedulerConfig {
        rate: SamplingRate::Game,
        sleep_interval_ms: 5000,
        read_interval_ms: 1000,
        warmup_interval_ms: 1000,
    }
}

#[test]
fn test_cycle_end_to_end() {
    let (service, host) = setup(short_cycle());
    service.start();

    run_until(&service, &host, 999);
    assert_eq!(service.phase(), Phase::WarmingUp);
    assert_eq!(host.lock().unwrap().activations, vec![0]);
    assert_eq!(host.lock().unwrap().holds, 1);

    run_until(&service, &host, 1000);
    assert_eq!(service.phase(), Phase::Recording);
    assert!(service.last_window().is_empty());

    run_until(&service, &host, 2000);
    assert_eq!(service.phase(), Phase::Sleeping);
    {
        let h = host.lock().unwrap();
        assert_eq!(h.deactivations, vec![2000]);
        assert_eq!(h.holds, 0);
    }

    let window = service.last_window();
    assert_eq!(window.len(), 10);
    assert!(
        window
            .iter()
            .all(|p| (1000..2000).contains(&p.timestamp_ms))
    );
    assert_eq!(service.last_timestamp(), Some(1900));
    // Warm-up deliveries are charged too: t = 0, 100, ..., 1900.
    assert_eq!(service.total_work(), 20.0);

    run_until(&service, &host, 4999);
    assert_eq!(host.lock().unwrap().activations, vec![0]);
    run_until(&service, &host, 5000);
    assert_eq!(host.lock().unwrap().activations, vec![0, 5000]);
}

#[test]
fn test_budget_denied_wake_up_skips_cycle() {
    let (service, host) = setup(short_cycle());
    service.set_work_limit(0.0);
    service.start();

    run_until(&service, &host, 4000);
    assert_eq!(service.phase(), Phase::Sleeping);
    let h = host.lock().unwrap();
    assert!(h.activations.is_empty());
    assert_eq!(h.holds, 0);
    assert!(h.timers.is_empty());
}

#[test]
fn test_limit_granted_later_resumes_cycling() {
    let (service, host) = setup(short_cycle());
    service.set_work_limit(0.0);
    service.start();
    run_until(&service, &host, 100);

    service.set_work_limit(1000.0);
    run_until(&service, &host, 5000);
    assert_eq!(host.lock().unwrap().activations, vec![5000]);
}

#[test]
fn test_limit_change_mid_recording_finishes_cycle() {
    let (service, host) = setup(short_cycle());
    service.start();
    run_until(&service, &host, 1500);

    service.set_work_limit(0.0);
    run_until(&service, &host, 5000);

    // The in-flight cycle published all of its samples.
    assert_eq!(service.last_window().len(), 10);
    // The next admission was denied.
    assert_eq!(host.lock().unwrap().activations, vec![0]);
    assert_eq!(service.phase(), Phase::Sleeping);
}

#[test]
fn test_interval_change_takes_effect_immediately() {
    let (service, host) = setup(SchedulerConfig {
        sleep_interval_ms: 60_000,
        ..short_cycle()
    });
    service.start();
    run_until(&service, &host, 2500);

    assert_eq!(service.suggest_interval(5000), 5000);
    run_until(&service, &host, 7500);
    assert_eq!(host.lock().unwrap().activations, vec![0, 2500, 7500]);
}

#[test]
fn test_stop_mid_cycle_discards_and_ignores_late_timer() {
    let (service, host) = setup(short_cycle());
    service.start();
    service.start();
    run_until(&service, &host, 2500);
    let first = service.last_window();
    run_until(&service, &host, 6500);

    let in_flight = host.lock().unwrap().timers[0].1;
    assert_eq!(in_flight.kind, TimerKind::Read);

    assert!(!service.stop());
    assert_eq!(service.phase(), Phase::Recording);
    assert!(service.stop());
    assert_eq!(service.phase(), Phase::Idle);
    {
        let h = host.lock().unwrap();
        assert!(!h.sensor_on);
        assert!(h.timers.is_empty());
        assert!(h.wake.is_none());
        assert_eq!(h.holds, 0);
    }

    // The cancelled timer was already queued when stop ran.
    service.on_timer(in_flight);
    assert_eq!(service.phase(), Phase::Idle);
    assert!(service.last_window().same_window(&first));

    run_until(&service, &host, 20_000);
    assert_eq!(host.lock().unwrap().activations, vec![0, 5000]);
}

#[test]
fn test_restart_after_stop_uses_fresh_generation() {
    let (service, host) = setup(short_cycle());
    service.start();
    run_until(&service, &host, 500);
    let stale = host.lock().unwrap().timers[0].1;

    service.stop();
    service.start();
    run_until(&service, &host, 700);

    service.on_timer(stale);
    assert_eq!(service.phase(), Phase::WarmingUp);

    run_until(&service, &host, 2700);
    assert_eq!(service.phase(), Phase::Sleeping);
    assert_eq!(service.last_window().len(), 10);
}

#[test]
fn test_reading_length_change_applies_next_cycle() {
    let (service, host) = setup(short_cycle());
    service.start();
    run_until(&service, &host, 500);

    assert_eq!(service.set_reading_length(500), 500);
    assert_eq!(service.set_warmup_length(0), 1000);
    run_until(&service, &host, 4000);
    assert_eq!(service.last_window().len(), 10);

    run_until(&service, &host, 7000);
    assert_eq!(service.last_window().len(), 5);
    assert_eq!(host.lock().unwrap().deactivations, vec![2000, 6500]);
}

#[test]
fn test_unbounded_reading_length_keeps_service_cycling() {
    let (service, host) = setup(SchedulerConfig {
        rate: SamplingRate::Fastest,
        ..short_cycle()
    });
    assert_eq!(service.set_reading_length(i64::MAX), i64::MAX);
    service.start();

    run_until(&service, &host, 3000);
    assert_eq!(service.phase(), Phase::Recording);

    // The read timer lies beyond any horizon; deliver it by hand.
    let read = {
        let mut h = host.lock().unwrap();
        let (at, token) = h.timers.remove(0);
        assert_eq!(at, i64::MAX);
        token
    };
    service.on_timer(read);
    assert_eq!(service.phase(), Phase::Sleeping);
    // Deliveries at t = 1000, 1100, ..., 3000.
    assert_eq!(service.last_window().len(), 21);
    assert_eq!(host.lock().unwrap().holds, 0);

    run_until(&service, &host, 5000);
    assert_eq!(host.lock().unwrap().activations, vec![0, 5000]);
    assert_eq!(service.phase(), Phase::WarmingUp);
}

#[test]
fn test_unbounded_warmup_length_stops_cleanly() {
    let (service, host) = setup(short_cycle());
    assert_eq!(service.set_warmup_length(i64::MAX), i64::MAX);
    service.start();

    run_until(&service, &host, 12_000);
    assert_eq!(service.phase(), Phase::WarmingUp);
    assert_eq!(host.lock().unwrap().activations, vec![0]);

    assert!(service.stop());
    let h = host.lock().unwrap();
    assert!(!h.sensor_on);
    assert!(h.timers.is_empty());
    assert_eq!(h.holds, 0);
}

#[test]
fn test_reset_with_unchanged_interval_keeps_cadence() {
    let (service, host) = setup(SchedulerConfig {
        sleep_interval_ms: 60_000,
        ..short_cycle()
    });
    service.start();
    run_until(&service, &host, 10_000);

    service.reset_to_default();
    run_until(&service, &host, 20_000);
    assert_eq!(host.lock().unwrap().activations, vec![0]);

    assert_eq!(service.suggest_interval(10_000), 10_000);
    run_until(&service, &host, 25_000);
    service.reset_to_default();
    run_until(&service, &host, 25_000);
    assert_eq!(host.lock().unwrap().activations, vec![0, 20_000, 25_000]);
}
