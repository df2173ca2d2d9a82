/// Tracks how many raw samples the sensor has produced against an externally
/// imposed work limit.
///
/// `total` is lifetime consumption and is never reset. `current` is consumption
/// since the limit was last set. Without a limit every sample is admitted.
#[derive(Debug, Clone, Default)]
pub struct BudgetCounter {
    total: f64,
    current: f64,
    limit: Option<f64>,
}

impl BudgetCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff no limit is set or the current period is still under it.
    #[inline(always)]
    pub fn has_budget(&self) -> bool {
        match self.limit {
            None => true,
            Some(limit) => self.current < limit,
        }
    }

    /// Charges one sample if budget allows. Returns whether it was charged.
    #[inline(always)]
    pub fn count(&mut self) -> bool {
        if !self.has_budget() {
            return false;
        }
        self.total += 1.0;
        self.current += 1.0;
        true
    }

    /// Installs a new limit and starts a fresh period.
    ///
    /// A NaN limit clears it, matching the power monitor's "no limit" encoding.
    pub fn set_limit(&mut self, limit: f64) {
        self.limit = if limit.is_nan() { None } else { Some(limit) };
        self.current = 0.0;
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn limit(&self) -> Option<f64> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_counts_everything() {
        let mut budget = BudgetCounter::new();
        for _ in 0..10 {
            assert!(budget.count());
        }
        assert_eq!(budget.total(), 10.0);
        assert_eq!(budget.current(), 10.0);
        assert!(budget.has_budget());
    }

    #[test]
    fn test_limit_stops_counting() {
        let mut budget = BudgetCounter::new();
        budget.set_limit(3.0);

        let charged = (0..5).filter(|_| budget.count()).count();
        assert_eq!(charged, 3);
        assert_eq!(budget.total(), 3.0);
        assert!(!budget.has_budget());

        // A refused count leaves state untouched.
        assert!(!budget.count());
        assert_eq!(budget.current(), 3.0);
    }

    #[test]
    fn test_set_limit_resets_period_only() {
        let mut budget = BudgetCounter::new();
        for _ in 0..7 {
            budget.count();
        }
        budget.set_limit(5.0);
        assert_eq!(budget.current(), 0.0);
        assert_eq!(budget.total(), 7.0);
        assert!(budget.has_budget());

        budget.set_limit(0.0);
        assert!(!budget.has_budget());
    }

    #[test]
    fn test_nan_limit_means_unlimited() {
        let mut budget = BudgetCounter::new();
        budget.set_limit(0.0);
        assert!(!budget.has_budget());
        budget.set_limit(f64::NAN);
        assert_eq!(budget.limit(), None);
        assert!(budget.has_budget());
    }

    #[test]
    fn test_total_is_monotonic_under_limit_changes() {
        let mut budget = BudgetCounter::new();
        let mut last = 0.0;
        let mut admitted = 0;
        for step in 0..100 {
            if step % 17 == 0 {
                budget.set_limit((step % 5) as f64);
            }
            if budget.count() {
                admitted += 1;
            }
            assert!(budget.total() >= last);
            last = budget.total();
        }
        assert_eq!(budget.total(), admitted as f64);
    }
}
