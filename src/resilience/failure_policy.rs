use failsafe::failure_policy::FailurePolicy;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trips when the share of failed calls inside a rolling window reaches a
/// threshold, provided the window holds at least `volume_threshold` calls.
///
/// Once tripped the breaker stays open for `sleep_window`; the window is
/// cleared when the breaker closes again.
#[derive(Debug, Clone)]
pub struct ErrorPercentage {
    threshold_percent: f64,
    volume_threshold: u32,
    window: Duration,
    sleep_window: Duration,
    outcomes: VecDeque<(Instant, bool)>,
}

impl ErrorPercentage {
    pub fn new(
        threshold_percent: u8,
        volume_threshold: u32,
        window: Duration,
        sleep_window: Duration,
    ) -> Self {
        Self {
            threshold_percent: f64::from(threshold_percent),
            volume_threshold,
            window,
            sleep_window,
            outcomes: VecDeque::new(),
        }
    }

    pub fn error_percent(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|(_, ok)| !ok).count();
        failures as f64 * 100.0 / self.outcomes.len() as f64
    }

    fn record(&mut self, success: bool) {
        let now = Instant::now();
        self.evict(now);
        self.outcomes.push_back((now, success));
    }

    fn evict(&mut self, now: Instant) {
        while let Some((at, _)) = self.outcomes.front() {
            if now.duration_since(*at) > self.window {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_tripped(&self) -> bool {
        self.outcomes.len() as u32 >= self.volume_threshold
            && self.error_percent() >= self.threshold_percent
    }
}

impl FailurePolicy for ErrorPercentage {
    fn record_success(&mut self) {
        self.record(true);
    }

    fn mark_dead_on_failure(&mut self) -> Option<Duration> {
        self.record(false);
        if self.is_tripped() {
            Some(self.sleep_window)
        } else {
            None
        }
    }

    fn revived(&mut self) {
        self.outcomes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(volume: u32) -> ErrorPercentage {
        ErrorPercentage::new(25, volume, Duration::from_secs(10), Duration::from_secs(5))
    }

    #[test]
    fn test_trips_at_threshold() {
        let mut p = policy(4);
        p.record_success();
        p.record_success();
        p.record_success();
        assert_eq!(p.mark_dead_on_failure(), Some(Duration::from_secs(5)));
        assert_eq!(p.error_percent(), 25.0);
    }

    #[test]
    fn test_below_threshold_stays_closed() {
        let mut p = policy(1);
        for _ in 0..4 {
            p.record_success();
        }
        // 1 failure out of 5 calls is 20%.
        assert_eq!(p.mark_dead_on_failure(), None);
    }

    #[test]
    fn test_volume_threshold_gates_tripping() {
        let mut p = policy(20);
        for _ in 0..5 {
            assert_eq!(p.mark_dead_on_failure(), None);
        }
        assert_eq!(p.error_percent(), 100.0);
    }

    #[test]
    fn test_old_outcomes_leave_the_window() {
        let mut p = ErrorPercentage::new(
            50,
            1,
            Duration::from_millis(20),
            Duration::from_secs(1),
        );
        p.record_success();
        p.record_success();
        std::thread::sleep(Duration::from_millis(40));
        // Only this failure remains in the window.
        assert!(p.mark_dead_on_failure().is_some());
    }

    #[test]
    fn test_revived_clears_history() {
        let mut p = policy(1);
        assert!(p.mark_dead_on_failure().is_some());
        p.revived();
        assert_eq!(p.error_percent(), 0.0);
    }
}
