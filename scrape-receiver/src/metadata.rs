use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The type of a scraped metric as announced by the target's `# TYPE` line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// A monotonically increasing counter.
    Counter,
    /// A value that can go up and down.
    Gauge,
    /// Cumulative bucketed observations with `_bucket`, `_sum` and `_count` series.
    Histogram,
    /// A histogram whose buckets are gauges.
    #[serde(rename = "gaugehistogram")]
    GaugeHistogram,
    /// Streaming quantiles with `_sum` and `_count` series.
    Summary,
    /// Textual information about the target, exposed with a constant value.
    Info,
    /// A set of boolean states.
    #[serde(rename = "stateset")]
    StateSet,
    /// A metric without type information.
    #[default]
    Unknown,
}

impl MetricType {
    /// Returns the name of this type as it appears in the exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::GaugeHistogram => "gaugehistogram",
            Self::Summary => "summary",
            Self::Info => "info",
            Self::StateSet => "stateset",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type, help and unit of a metric family.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricMetadata {
    /// The metric family name the metadata was announced for.
    pub metric: String,
    /// The announced type.
    #[serde(rename = "type")]
    pub ty: MetricType,
    /// Help text.
    pub help: String,
    /// Unit of the metric.
    pub unit: String,
}

impl MetricMetadata {
    /// Creates metadata for a metric without help text or unit.
    pub fn new(metric: impl Into<String>, ty: MetricType) -> Self {
        Self {
            metric: metric.into(),
            ty,
            help: String::new(),
            unit: String::new(),
        }
    }
}

/// Lookup of metric metadata by metric name.
///
/// Implemented by the scrape scheduler, which collects metadata while parsing the scrape payload.
pub trait MetadataStore: Send + Sync {
    /// Returns the metadata registered for the given metric name.
    fn metadata(&self, metric: &str) -> Option<MetricMetadata>;
}

impl MetadataStore for HashMap<String, MetricMetadata> {
    fn metadata(&self, metric: &str) -> Option<MetricMetadata> {
        self.get(metric).cloned()
    }
}

/// Metrics Prometheus synthesizes for every scrape.
///
/// These metrics never have metadata in the scrape payload and are always gauges.
const INTERNAL_METRICS: &[(&str, &str)] = &[
    ("up", "The scraping was successful"),
    (
        "scrape_duration_seconds",
        "Duration of the scrape in seconds",
    ),
    (
        "scrape_samples_scraped",
        "The number of samples the target exposed",
    ),
    (
        "scrape_samples_post_metric_relabeling",
        "The number of samples remaining after metric relabeling was applied",
    ),
    (
        "scrape_series_added",
        "The approximate number of new series in this scrape",
    ),
];

/// Returns metadata for metrics synthesized by the scraper itself.
pub fn internal_metadata(metric: &str) -> Option<MetricMetadata> {
    INTERNAL_METRICS
        .iter()
        .find(|(name, _)| *name == metric)
        .map(|(name, help)| MetricMetadata {
            metric: (*name).to_owned(),
            ty: MetricType::Gauge,
            help: (*help).to_owned(),
            unit: String::new(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_metadata() {
        let metadata = internal_metadata("scrape_series_added").unwrap();
        assert_eq!(metadata.ty, MetricType::Gauge);
        assert!(internal_metadata("process_start_time_seconds").is_none());
    }

    #[test]
    fn test_deserialize_metadata() {
        let metadata: MetricMetadata =
            serde_json::from_str(r#"{"metric": "rpc", "type": "gaugehistogram"}"#).unwrap();
        assert_eq!(metadata.ty, MetricType::GaugeHistogram);
        assert_eq!(metadata.help, "");
    }
}
