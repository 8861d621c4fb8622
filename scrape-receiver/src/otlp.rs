//! Conversion of metric batches into OTLP.

use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue, any_value};
use opentelemetry_proto::tonic::metrics::v1::{
    self as otlp, AggregationTemporality, DataPointFlags, ResourceMetrics, ScopeMetrics,
    metric::Data, number_data_point, summary_data_point::ValueAtQuantile,
};
use opentelemetry_proto::tonic::resource::v1::Resource as OtlpResource;

use crate::batch::{
    Attributes, HistogramPoint, Metric, MetricData, MetricsBatch, NumberPoint, SummaryPoint,
};
use crate::exemplar::Exemplar;
use crate::resource::Resource;

/// Name of the instrumentation scope all converted metrics are reported under.
const SCOPE_NAME: &str = env!("CARGO_PKG_NAME");

fn key_value(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_owned(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_owned())),
        }),
    }
}

fn attributes(attributes: &Attributes) -> Vec<KeyValue> {
    attributes
        .iter()
        .map(|(key, value)| key_value(key, value))
        .collect()
}

fn flags(no_recorded_value: bool) -> u32 {
    if no_recorded_value {
        DataPointFlags::NoRecordedValueMask as u32
    } else {
        0
    }
}

impl From<&Resource> for OtlpResource {
    fn from(resource: &Resource) -> Self {
        OtlpResource {
            attributes: resource
                .attributes()
                .into_iter()
                .map(|(key, value)| key_value(key, value))
                .collect(),
            ..Default::default()
        }
    }
}

impl From<Exemplar> for otlp::Exemplar {
    fn from(exemplar: Exemplar) -> Self {
        // All-zero identifiers are invalid in OTLP and must be omitted.
        let trace_id = if exemplar.trace_id.is_empty() {
            Vec::new()
        } else {
            exemplar.trace_id.as_bytes().to_vec()
        };
        let span_id = if exemplar.span_id.is_empty() {
            Vec::new()
        } else {
            exemplar.span_id.as_bytes().to_vec()
        };

        otlp::Exemplar {
            filtered_attributes: attributes(&exemplar.filtered_attributes),
            time_unix_nano: exemplar.time_unix_nano,
            span_id,
            trace_id,
            value: Some(otlp::exemplar::Value::AsDouble(exemplar.value)),
        }
    }
}

impl From<NumberPoint> for otlp::NumberDataPoint {
    fn from(point: NumberPoint) -> Self {
        otlp::NumberDataPoint {
            attributes: attributes(&point.attributes),
            start_time_unix_nano: point.start_time_unix_nano,
            time_unix_nano: point.time_unix_nano,
            exemplars: point.exemplars.into_iter().map(Into::into).collect(),
            flags: flags(point.no_recorded_value),
            value: Some(number_data_point::Value::AsDouble(point.value)),
        }
    }
}

impl From<HistogramPoint> for otlp::HistogramDataPoint {
    fn from(point: HistogramPoint) -> Self {
        otlp::HistogramDataPoint {
            attributes: attributes(&point.attributes),
            start_time_unix_nano: point.start_time_unix_nano,
            time_unix_nano: point.time_unix_nano,
            count: point.count,
            sum: point.sum,
            bucket_counts: point.bucket_counts,
            explicit_bounds: point.explicit_bounds,
            exemplars: point.exemplars.into_iter().map(Into::into).collect(),
            flags: flags(point.no_recorded_value),
            ..Default::default()
        }
    }
}

impl From<SummaryPoint> for otlp::SummaryDataPoint {
    fn from(point: SummaryPoint) -> Self {
        otlp::SummaryDataPoint {
            attributes: attributes(&point.attributes),
            start_time_unix_nano: point.start_time_unix_nano,
            time_unix_nano: point.time_unix_nano,
            count: point.count,
            sum: point.sum,
            quantile_values: point
                .quantile_values
                .into_iter()
                .map(|q| ValueAtQuantile {
                    quantile: q.quantile,
                    value: q.value,
                })
                .collect(),
            flags: flags(point.no_recorded_value),
        }
    }
}

fn convert_all<S, T: From<S>>(items: Vec<S>) -> Vec<T> {
    items.into_iter().map(T::from).collect()
}

impl From<MetricData> for Data {
    fn from(data: MetricData) -> Self {
        let cumulative = AggregationTemporality::Cumulative as i32;

        match data {
            MetricData::Gauge { points } => Data::Gauge(otlp::Gauge {
                data_points: convert_all(points),
            }),
            MetricData::Sum { monotonic, points } => Data::Sum(otlp::Sum {
                data_points: convert_all(points),
                aggregation_temporality: cumulative,
                is_monotonic: monotonic,
            }),
            MetricData::Histogram { points } => Data::Histogram(otlp::Histogram {
                data_points: convert_all(points),
                aggregation_temporality: cumulative,
            }),
            MetricData::Summary { points } => Data::Summary(otlp::Summary {
                data_points: convert_all(points),
            }),
        }
    }
}

impl From<Metric> for otlp::Metric {
    fn from(metric: Metric) -> Self {
        otlp::Metric {
            name: metric.name,
            description: metric.description,
            unit: metric.unit,
            data: Some(metric.data.into()),
            ..Default::default()
        }
    }
}

impl MetricsBatch {
    /// Converts this batch into an OTLP `ResourceMetrics` message.
    ///
    /// All metrics are reported under a single instrumentation scope. Histograms, sums and
    /// summaries use cumulative temporality.
    pub fn into_resource_metrics(self) -> ResourceMetrics {
        ResourceMetrics {
            resource: Some(OtlpResource::from(&self.resource)),
            scope_metrics: vec![ScopeMetrics {
                scope: Some(InstrumentationScope {
                    name: SCOPE_NAME.to_owned(),
                    version: env!("CARGO_PKG_VERSION").to_owned(),
                    ..Default::default()
                }),
                metrics: convert_all(self.metrics),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}
