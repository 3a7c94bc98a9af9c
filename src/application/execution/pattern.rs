use std::collections::VecDeque;
use std::time::Instant;
use tracing::info;

/// Execution instants retained per symbol.
const CAPACITY: usize = 10;
/// Intervals tighter than this coefficient of variation read as a cadence.
const CADENCE_CV_THRESHOLD: f64 = 0.2;
/// Minimum samples before cadence analysis runs.
const MIN_SAMPLES: usize = 3;

/// Watches real-execution timestamps for one symbol and flags detectable
/// cadences, so later executions get extra jitter.
#[derive(Debug)]
pub struct PatternTracker {
    times: VecDeque<Instant>,
    flagged: bool,
}

impl PatternTracker {
    pub fn new() -> Self {
        Self {
            times: VecDeque::with_capacity(CAPACITY),
            flagged: false,
        }
    }

    pub fn record(&mut self, symbol: &str, now: Instant) {
        if self.times.len() == CAPACITY {
            self.times.pop_front();
        }
        self.times.push_back(now);

        if self.times.len() >= MIN_SAMPLES {
            self.analyze(symbol);
        }
    }

    pub fn flagged(&self) -> bool {
        self.flagged
    }

    fn analyze(&mut self, symbol: &str) {
        let intervals: Vec<f64> = self
            .times
            .iter()
            .zip(self.times.iter().skip(1))
            .map(|(a, b)| b.duration_since(*a).as_secs_f64())
            .collect();
        if intervals.len() < 2 {
            return;
        }

        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        if mean <= 0.0 {
            return;
        }
        let variance = intervals
            .iter()
            .map(|i| (i - mean).powi(2))
            .sum::<f64>()
            / intervals.len() as f64;
        let std_dev = variance.sqrt();

        if std_dev / mean < CADENCE_CV_THRESHOLD && !self.flagged {
            info!(
                "PatternTracker [{}]: execution cadence detected (cv={:.3}), boosting jitter",
                symbol,
                std_dev / mean
            );
            self.flagged = true;
        }
    }
}

impl Default for PatternTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_regular_cadence_is_flagged() {
        let mut tracker = PatternTracker::new();
        let base = Instant::now();

        for i in 0..5 {
            tracker.record("TSLA", base + Duration::from_secs(i * 60));
        }
        assert!(tracker.flagged());
    }

    #[test]
    fn test_irregular_intervals_stay_unflagged() {
        let mut tracker = PatternTracker::new();
        let base = Instant::now();

        let offsets = [0u64, 10, 130, 150, 400, 410];
        for offset in offsets {
            tracker.record("TSLA", base + Duration::from_secs(offset));
        }
        assert!(!tracker.flagged());
    }

    #[test]
    fn test_too_few_samples_no_analysis() {
        let mut tracker = PatternTracker::new();
        let base = Instant::now();

        tracker.record("TSLA", base);
        tracker.record("TSLA", base + Duration::from_secs(60));
        assert!(!tracker.flagged());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = PatternTracker::new();
        let base = Instant::now();

        for i in 0..30 {
            tracker.record("TSLA", base + Duration::from_secs(i * 7));
        }
        assert_eq!(tracker.times.len(), CAPACITY);
    }
}
