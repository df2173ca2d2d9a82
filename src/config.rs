use std::fmt;
use std::time::Duration;

pub const ONE_SECOND_MS: i64 = 1000;
pub const ONE_MINUTE_MS: i64 = 60 * ONE_SECOND_MS;

/// Hard lower bound on the duty-cycle period.
pub const MIN_SLEEP_INTERVAL_MS: i64 = 5 * ONE_SECOND_MS;
pub const DEFAULT_SLEEP_INTERVAL_MS: i64 = ONE_MINUTE_MS;
pub const DEFAULT_READ_INTERVAL_MS: i64 = ONE_SECOND_MS;
pub const DEFAULT_WARMUP_INTERVAL_MS: i64 = ONE_SECOND_MS;

/// Sensor delivery rate, in the platform's sensor-delay vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SamplingRate {
    Fastest,
    #[default]
    Game,
    Ui,
    Normal,
}

impl SamplingRate {
    /// Maps a host rate code. Anything unrecognized falls back to `Game`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => SamplingRate::Fastest,
            1 => SamplingRate::Game,
            2 => SamplingRate::Ui,
            3 => SamplingRate::Normal,
            _ => SamplingRate::Game,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            SamplingRate::Fastest => 0,
            SamplingRate::Game => 1,
            SamplingRate::Ui => 2,
            SamplingRate::Normal => 3,
        }
    }

    /// Approximate spacing between deliveries at this rate.
    pub fn nominal_period(self) -> Duration {
        match self {
            SamplingRate::Fastest => Duration::from_millis(5),
            SamplingRate::Game => Duration::from_millis(20),
            SamplingRate::Ui => Duration::from_millis(60),
            SamplingRate::Normal => Duration::from_millis(200),
        }
    }

    /// Expected number of deliveries over `length_ms`, used to pre-size windows.
    /// Saturates instead of overflowing.
    pub fn expected_samples(self, length_ms: i64) -> usize {
        if length_ms <= 0 {
            return 0;
        }
        let period = self.nominal_period().as_millis().max(1) as i64;
        usize::try_from(length_ms / period)
            .unwrap_or(usize::MAX)
            .saturating_add(1)
    }
}

impl fmt::Display for SamplingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SamplingRate::Fastest => "fastest",
            SamplingRate::Game => "game",
            SamplingRate::Ui => "ui",
            SamplingRate::Normal => "normal",
        };
        write!(f, "{}({})", name, self.code())
    }
}

/// Duty-cycle parameters. Only the negotiation methods below mutate them, and
/// each returns the value actually applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub rate: SamplingRate,
    pub sleep_interval_ms: i64,
    pub read_interval_ms: i64,
    pub warmup_interval_ms: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate: SamplingRate::Game,
            sleep_interval_ms: DEFAULT_SLEEP_INTERVAL_MS,
            read_interval_ms: DEFAULT_READ_INTERVAL_MS,
            warmup_interval_ms: DEFAULT_WARMUP_INTERVAL_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn apply_rate(&mut self, code: i32) -> SamplingRate {
        self.rate = SamplingRate::from_code(code);
        self.rate
    }

    /// Clamps to `MIN_SLEEP_INTERVAL_MS`; anything at or above the floor is kept.
    pub fn apply_sleep_interval(&mut self, requested_ms: i64) -> i64 {
        self.sleep_interval_ms = requested_ms.max(MIN_SLEEP_INTERVAL_MS);
        self.sleep_interval_ms
    }

    pub fn apply_read_interval(&mut self, length_ms: i64) -> i64 {
        self.read_interval_ms = length_ms;
        self.read_interval_ms
    }

    /// Non-positive lengths restore the default warm-up.
    pub fn apply_warmup_interval(&mut self, length_ms: i64) -> i64 {
        self.warmup_interval_ms = if length_ms > 0 {
            length_ms
        } else {
            DEFAULT_WARMUP_INTERVAL_MS
        };
        self.warmup_interval_ms
    }

    /// Restores rate, sleep and read interval. Warm-up is kept.
    pub fn reset_to_default(&mut self) {
        let defaults = SchedulerConfig::default();
        self.rate = defaults.rate;
        self.sleep_interval_ms = defaults.sleep_interval_ms;
        self.read_interval_ms = defaults.read_interval_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_codes() {
        assert_eq!(SamplingRate::from_code(0), SamplingRate::Fastest);
        assert_eq!(SamplingRate::from_code(3), SamplingRate::Normal);
        assert_eq!(SamplingRate::from_code(-4), SamplingRate::Game);
        assert_eq!(SamplingRate::from_code(99), SamplingRate::Game);
        for code in 0..4 {
            assert_eq!(SamplingRate::from_code(code).code(), code);
        }
    }

    #[test]
    fn test_interval_floor() {
        let mut config = SchedulerConfig::default();
        assert_eq!(config.apply_sleep_interval(1000), 5000);
        assert_eq!(config.apply_sleep_interval(-1), 5000);
        assert_eq!(config.apply_sleep_interval(5000), 5000);
        assert_eq!(config.apply_sleep_interval(10_000), 10_000);
        assert_eq!(config.sleep_interval_ms, 10_000);
    }

    #[test]
    fn test_reading_length_has_no_floor() {
        let mut config = SchedulerConfig::default();
        assert_eq!(config.apply_read_interval(10), 10);
        assert_eq!(config.apply_read_interval(0), 0);
    }

    #[test]
    fn test_warmup_defaults_on_non_positive() {
        let mut config = SchedulerConfig::default();
        assert_eq!(config.apply_warmup_interval(250), 250);
        assert_eq!(config.apply_warmup_interval(0), DEFAULT_WARMUP_INTERVAL_MS);
        assert_eq!(config.apply_warmup_interval(-7), DEFAULT_WARMUP_INTERVAL_MS);
    }

    #[test]
    fn test_reset_keeps_warmup() {
        let mut config = SchedulerConfig::default();
        config.apply_rate(0);
        config.apply_sleep_interval(30_000);
        config.apply_read_interval(3_000);
        config.apply_warmup_interval(400);
        config.reset_to_default();

        assert_eq!(config.rate, SamplingRate::Game);
        assert_eq!(config.sleep_interval_ms, DEFAULT_SLEEP_INTERVAL_MS);
        assert_eq!(config.read_interval_ms, DEFAULT_READ_INTERVAL_MS);
        assert_eq!(config.warmup_interval_ms, 400);
    }

    #[test]
    fn test_expected_samples() {
        assert_eq!(SamplingRate::Game.expected_samples(1000), 51);
        assert_eq!(SamplingRate::Normal.expected_samples(0), 0);
        assert_eq!(
            SamplingRate::Fastest.expected_samples(i64::MAX),
            usize::try_from(i64::MAX / 5)
                .unwrap_or(usize::MAX)
                .saturating_add(1)
        );
    }
}
