//! The metrics batch emitted by a committed transaction.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::exemplar::Exemplar;
use crate::resource::Resource;

/// Point attributes, the labels of a series without reserved labels.
pub type Attributes = BTreeMap<String, String>;

/// All metrics collected in one scrape, attributed to a single [`Resource`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MetricsBatch {
    /// The scraped entity.
    pub resource: Resource,
    /// Metrics in the order their first sample was appended.
    pub metrics: Vec<Metric>,
}

impl MetricsBatch {
    /// Returns the total number of data points across all metrics.
    pub fn point_count(&self) -> usize {
        self.metrics.iter().map(|metric| metric.data.len()).sum()
    }

    /// Returns the metric with the given name.
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|metric| metric.name == name)
    }
}

/// A metric family with its data points.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Metric {
    /// The metric family name.
    pub name: String,
    /// Help text from the metric metadata.
    pub description: String,
    /// Unit from the metric metadata.
    pub unit: String,
    /// The data points.
    pub data: MetricData,
}

/// Typed data points of a [`Metric`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricData {
    /// Values that can go up and down.
    Gauge {
        /// The data points.
        points: Vec<NumberPoint>,
    },
    /// Cumulative sums.
    Sum {
        /// Whether the sum only ever increases.
        monotonic: bool,
        /// The data points.
        points: Vec<NumberPoint>,
    },
    /// Cumulative bucketed distributions.
    Histogram {
        /// The data points.
        points: Vec<HistogramPoint>,
    },
    /// Cumulative quantile summaries.
    Summary {
        /// The data points.
        points: Vec<SummaryPoint>,
    },
}

impl MetricData {
    /// Returns the number of data points.
    pub fn len(&self) -> usize {
        match self {
            Self::Gauge { points } | Self::Sum { points, .. } => points.len(),
            Self::Histogram { points } => points.len(),
            Self::Summary { points } => points.len(),
        }
    }

    /// Returns `true` if there are no data points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sets the start time on all cumulative points that do not have one yet.
    ///
    /// Gauges have no start time and are left untouched.
    pub fn set_default_start_time(&mut self, start_time_unix_nano: u64) {
        fn fill(slot: &mut u64, value: u64) {
            if *slot == 0 {
                *slot = value;
            }
        }

        match self {
            Self::Gauge { .. } => (),
            Self::Sum { points, .. } => points
                .iter_mut()
                .for_each(|p| fill(&mut p.start_time_unix_nano, start_time_unix_nano)),
            Self::Histogram { points } => points
                .iter_mut()
                .for_each(|p| fill(&mut p.start_time_unix_nano, start_time_unix_nano)),
            Self::Summary { points } => points
                .iter_mut()
                .for_each(|p| fill(&mut p.start_time_unix_nano, start_time_unix_nano)),
        }
    }
}

impl Default for MetricData {
    fn default() -> Self {
        Self::Gauge { points: Vec::new() }
    }
}

/// A single numeric value.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NumberPoint {
    /// Series labels without reserved labels.
    pub attributes: Attributes,
    /// Start of the cumulative interval, zero if unknown.
    pub start_time_unix_nano: u64,
    /// Time of the observation.
    pub time_unix_nano: u64,
    /// The observed value.
    pub value: f64,
    /// Set when the series was marked stale.
    pub no_recorded_value: bool,
    /// Exemplars recorded for this value.
    pub exemplars: Vec<Exemplar>,
}

/// A histogram with explicit bucket bounds.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HistogramPoint {
    /// Series labels without reserved labels.
    pub attributes: Attributes,
    /// Start of the cumulative interval, zero if unknown.
    pub start_time_unix_nano: u64,
    /// Time of the observation.
    pub time_unix_nano: u64,
    /// Total number of observations.
    pub count: u64,
    /// Sum of all observations, if reported.
    pub sum: Option<f64>,
    /// Number of observations per bucket, one more than there are bounds.
    pub bucket_counts: Vec<u64>,
    /// Upper bounds of all buckets except for the implicit `+Inf` bucket.
    pub explicit_bounds: Vec<f64>,
    /// Set when the series was marked stale.
    pub no_recorded_value: bool,
    /// Exemplars recorded for observations in this histogram.
    pub exemplars: Vec<Exemplar>,
}

/// A value at a given quantile of a summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Quantile {
    /// The quantile in the range `[0, 1]`.
    pub quantile: f64,
    /// The value at the quantile.
    pub value: f64,
}

/// A summary of quantiles.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SummaryPoint {
    /// Series labels without reserved labels.
    pub attributes: Attributes,
    /// Start of the cumulative interval, zero if unknown.
    pub start_time_unix_nano: u64,
    /// Time of the observation.
    pub time_unix_nano: u64,
    /// Total number of observations.
    pub count: u64,
    /// Sum of all observations.
    pub sum: f64,
    /// Quantile values sorted by quantile.
    pub quantile_values: Vec<Quantile>,
    /// Set when the series was marked stale.
    pub no_recorded_value: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_start_time_skips_gauges_and_created() {
        let mut gauge = MetricData::Gauge {
            points: vec![NumberPoint::default()],
        };
        gauge.set_default_start_time(42);
        let MetricData::Gauge { points } = gauge else {
            unreachable!()
        };
        assert_eq!(points[0].start_time_unix_nano, 0);

        let mut sum = MetricData::Sum {
            monotonic: true,
            points: vec![
                NumberPoint::default(),
                NumberPoint {
                    start_time_unix_nano: 7,
                    ..Default::default()
                },
            ],
        };
        sum.set_default_start_time(42);
        let MetricData::Sum { points, .. } = sum else {
            unreachable!()
        };
        assert_eq!(points[0].start_time_unix_nano, 42);
        assert_eq!(points[1].start_time_unix_nano, 7);
    }
}
