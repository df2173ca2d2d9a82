use hdrhistogram::Histogram;
use std::fmt::Write;
use std::time::Duration;

/// Highest latency tracked: 10s in nanoseconds.
const MAX_TRACKED_NANOS: u64 = 10_000_000_000;

/// Kinds of work the runtime thread dispatches into the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    WakeUp,
    Timer,
    Sample,
}

impl DispatchKind {
    const ALL: [DispatchKind; 3] = [
        DispatchKind::WakeUp,
        DispatchKind::Timer,
        DispatchKind::Sample,
    ];

    fn index(self) -> usize {
        match self {
            DispatchKind::WakeUp => 0,
            DispatchKind::Timer => 1,
            DispatchKind::Sample => 2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            DispatchKind::WakeUp => "wake-up",
            DispatchKind::Timer => "timer",
            DispatchKind::Sample => "sample",
        }
    }
}

/// Latency summary in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p99: u64,
}

/// How long each dispatch into the service took, one histogram per kind.
///
/// Samples arrive far more often than anything else, so only every
/// `sample_rate`-th sample dispatch is recorded. Wake-ups and timers are always
/// recorded.
pub struct DispatchLatency {
    histograms: [Histogram<u64>; 3],
    sample_rate: u64,
    sample_step: u64,
}

impl DispatchLatency {
    pub fn new(sample_rate: u64) -> Self {
        assert!(sample_rate > 0, "sample_rate must be positive");
        Self {
            histograms: std::array::from_fn(|_| {
                Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_NANOS, 3)
                    .expect("1ns..10s at 3 significant figures is a valid range")
            }),
            sample_rate,
            sample_step: 0,
        }
    }

    pub fn measure(&mut self, kind: DispatchKind, elapsed: Duration) {
        if kind == DispatchKind::Sample {
            self.sample_step += 1;
            if !self.sample_step.is_multiple_of(self.sample_rate) {
                return;
            }
        }
        let nanos = (elapsed.as_nanos() as u64).clamp(1, MAX_TRACKED_NANOS);
        self.histograms[kind.index()].saturating_record(nanos);
    }

    pub fn stats(&self, kind: DispatchKind) -> LatencyStats {
        let histogram = &self.histograms[kind.index()];
        if histogram.len() == 0 {
            return LatencyStats::default();
        }
        LatencyStats {
            count: histogram.len(),
            min: histogram.min(),
            max: histogram.max(),
            mean: histogram.mean(),
            p50: histogram.value_at_quantile(0.5),
            p99: histogram.value_at_quantile(0.99),
        }
    }

    pub fn format_stats(&self) -> String {
        let mut out = String::new();
        for kind in DispatchKind::ALL {
            let stats = self.stats(kind);
            if stats.count == 0 {
                continue;
            }
            let _ = write!(
                out,
                "\t{}: n={}, min={}, mean={}, p50={}, p99={}, max={}",
                kind.label(),
                stats.count,
                format_nanos(stats.min as f64),
                format_nanos(stats.mean),
                format_nanos(stats.p50 as f64),
                format_nanos(stats.p99 as f64),
                format_nanos(stats.max as f64),
            );
        }
        if out.is_empty() {
            return "No stats collected yet".into();
        }
        out
    }
}

fn format_nanos(nanos: f64) -> String {
    if nanos < 1000.0 {
        format!("{:.1}ns", nanos)
    } else if nanos < 1_000_000.0 {
        format!("{:.1}us", nanos / 1000.0)
    } else {
        format!("{:.1}ms", nanos / 1_000_000.0)
    }
}
