use crate::config::MetricPattern;

/// The metric a target exposes its process start time in, in seconds since the UNIX epoch.
pub const DEFAULT_START_TIME_METRIC: &str = "process_start_time_seconds";

/// Records the start time reported by a scrape.
///
/// The start time marks the beginning of the interval of all cumulative metrics in the scrape.
#[derive(Clone, Debug, Default)]
pub struct StartTimeTracker {
    pattern: Option<MetricPattern>,
    value: Option<f64>,
}

impl StartTimeTracker {
    /// Creates a tracker that additionally recognizes metrics matching `pattern`.
    pub fn new(pattern: Option<MetricPattern>) -> Self {
        Self {
            pattern,
            value: None,
        }
    }

    /// Returns `true` if the metric reports the start time.
    pub fn matches(&self, metric_name: &str) -> bool {
        metric_name == DEFAULT_START_TIME_METRIC
            || self
                .pattern
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(metric_name))
    }

    /// Records the value of a sample if its metric reports the start time.
    ///
    /// The last recorded value wins.
    pub fn observe(&mut self, metric_name: &str, value: f64) {
        if self.matches(metric_name) {
            self.value = Some(value);
        }
    }

    /// Returns the recorded start time in seconds.
    ///
    /// A start time of exactly zero cannot be told apart from a missing one and is reported as
    /// unset.
    pub fn get(&self) -> Option<f64> {
        self.value.filter(|value| *value != 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_metric() {
        let mut tracker = StartTimeTracker::default();
        assert_eq!(tracker.get(), None);

        tracker.observe("process_cpu_seconds_total", 12.0);
        assert_eq!(tracker.get(), None);

        tracker.observe("process_start_time_seconds", 1_660_000_000.0);
        tracker.observe("process_start_time_seconds", 1_660_000_100.0);
        assert_eq!(tracker.get(), Some(1_660_000_100.0));
    }

    #[test]
    fn test_configured_pattern() {
        let pattern = MetricPattern::new("^jvm_start_time$").unwrap();
        let mut tracker = StartTimeTracker::new(Some(pattern));

        assert!(tracker.matches("process_start_time_seconds"));
        tracker.observe("jvm_start_time", 42.0);
        assert_eq!(tracker.get(), Some(42.0));
    }

    #[test]
    fn test_zero_is_unset() {
        let mut tracker = StartTimeTracker::default();
        tracker.observe("process_start_time_seconds", 0.0);
        assert_eq!(tracker.get(), None);
    }
}
