use indexmap::IndexMap;

use crate::batch::Metric;
use crate::error::TransactionError;
use crate::exemplar::Exemplar;
use crate::family::{MetricFamily, resolve_metadata};
use crate::labels::Labels;
use crate::metadata::MetadataStore;

/// Accumulates the metric families of one scrape.
///
/// Families are kept in the order their first sample was added, which is also the order of the
/// metrics in the built batch.
#[derive(Clone, Debug, Default)]
pub struct MetricBuilder {
    families: IndexMap<String, MetricFamily>,
}

impl MetricBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample to its family, creating the family on first sight.
    ///
    /// A family is only created once its first sample was accepted.
    pub fn add_data_point(
        &mut self,
        store: Option<&dyn MetadataStore>,
        metric_name: &str,
        labels: &Labels,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<(), TransactionError> {
        let metadata = resolve_metadata(metric_name, store);

        if let Some(family) = self.families.get_mut(&metadata.metric) {
            return family.add(metric_name, labels, timestamp_ms, value);
        }

        let mut family = MetricFamily::new(metadata);
        family.add(metric_name, labels, timestamp_ms, value)?;
        self.families.insert(family.name().to_owned(), family);
        Ok(())
    }

    /// Attaches an exemplar to the sample it was recorded for.
    pub fn add_exemplar(
        &mut self,
        store: Option<&dyn MetadataStore>,
        metric_name: &str,
        labels: &Labels,
        exemplar: Exemplar,
    ) -> Result<(), TransactionError> {
        let metadata = resolve_metadata(metric_name, store);

        match self.families.get_mut(&metadata.metric) {
            Some(family) => family.add_exemplar(metric_name, labels, exemplar),
            None => Err(TransactionError::NoMatchingSample {
                metric: metric_name.to_owned(),
                value: exemplar.value,
            }),
        }
    }

    /// Returns the family with the given name.
    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.get(name)
    }

    /// Iterates over all families in the order they were created.
    pub fn families(&self) -> impl Iterator<Item = &MetricFamily> {
        self.families.values()
    }

    /// Returns `true` if no sample has been added.
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Converts all families into metrics.
    ///
    /// `start_time_unix_nano` becomes the start of all cumulative points that did not report a
    /// start time of their own. Families without data points are skipped.
    pub fn build(self, start_time_unix_nano: u64) -> Vec<Metric> {
        self.families
            .into_values()
            .filter_map(MetricFamily::into_metric)
            .map(|mut metric| {
                metric.data.set_default_start_time(start_time_unix_nano);
                metric
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::batch::MetricData;
    use crate::labels;
    use crate::metadata::{MetricMetadata, MetricType};

    const TS: i64 = 1_660_233_371_385;

    #[test]
    fn test_families_in_first_seen_order() {
        let mut builder = MetricBuilder::new();
        for name in ["b_metric", "a_metric", "b_metric"] {
            builder
                .add_data_point(None, name, &labels! { "__name__" => name }, TS, 1.0)
                .unwrap();
        }

        let names: Vec<_> = builder.families().map(MetricFamily::name).collect();
        assert_eq!(names, vec!["b_metric", "a_metric"]);
    }

    #[test]
    fn test_rejected_sample_creates_no_family() {
        let store = HashMap::from([(
            "latency".to_owned(),
            MetricMetadata::new("latency", MetricType::Histogram),
        )]);

        let mut builder = MetricBuilder::new();
        let result = builder.add_data_point(
            Some(&store),
            "latency_bucket",
            &labels! { "__name__" => "latency_bucket" },
            TS,
            1.0,
        );

        assert!(result.is_err());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_exemplar_without_family() {
        let mut builder = MetricBuilder::new();
        let result = builder.add_exemplar(
            None,
            "missing",
            &labels! { "__name__" => "missing" },
            Exemplar::default(),
        );

        assert!(matches!(
            result,
            Err(TransactionError::NoMatchingSample { .. })
        ));
    }

    #[test]
    fn test_build_stamps_start_time() {
        let store = HashMap::from([
            (
                "requests_total".to_owned(),
                MetricMetadata::new("requests_total", MetricType::Counter),
            ),
            (
                "temperature".to_owned(),
                MetricMetadata::new("temperature", MetricType::Gauge),
            ),
        ]);

        let mut builder = MetricBuilder::new();
        for name in ["requests_total", "temperature"] {
            builder
                .add_data_point(Some(&store), name, &labels! { "__name__" => name }, TS, 5.0)
                .unwrap();
        }

        let metrics = builder.build(1_000);
        let starts: Vec<_> = metrics
            .iter()
            .map(|metric| match &metric.data {
                MetricData::Sum { points, .. } | MetricData::Gauge { points } => {
                    points[0].start_time_unix_nano
                }
                _ => unreachable!(),
            })
            .collect();

        assert_eq!(starts, vec![1_000, 0]);
    }
}
