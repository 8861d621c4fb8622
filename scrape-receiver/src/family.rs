//! Grouping of samples into metric families and series groups.
//!
//! A [`MetricFamily`] collects all series of one metric as announced by the target's metadata,
//! including the `_bucket`, `_sum`, `_count` and `_created` component series of histograms and
//! summaries. Within a family, a [`MetricGroup`] collects the samples of one label combination.

use indexmap::IndexMap;

use crate::batch::{
    Attributes, HistogramPoint, Metric, MetricData, NumberPoint, Quantile, SummaryPoint,
};
use crate::error::{LabelError, TransactionError};
use crate::exemplar::Exemplar;
use crate::labels::{
    BUCKET_LABEL, INSTANCE_LABEL, JOB_LABEL, Label, Labels, METRIC_NAME_LABEL, QUANTILE_LABEL,
};
use crate::metadata::{MetadataStore, MetricMetadata, MetricType, internal_metadata};
use crate::utils::{is_stale_marker, millis_to_nanos, seconds_to_nanos};

/// Suffixes of component series that are trimmed to find the metadata of their family.
const TRIMMABLE_SUFFIXES: &[&str] = &["_bucket", "_count", "_sum", "_total", "_info", "_created"];

/// Separates names and values in a [`GroupKey`]. Never occurs in valid UTF-8.
const KEY_SEPARATOR: u8 = 0xff;

/// Removes a known component suffix from a metric name.
///
/// A name that consists of the suffix only is returned unchanged.
///
/// # Example
///
/// ```
/// use scrape_receiver::normalize_metric_name;
///
/// assert_eq!(normalize_metric_name("rpc_duration_seconds_bucket"), "rpc_duration_seconds");
/// assert_eq!(normalize_metric_name("_sum"), "_sum");
/// ```
pub fn normalize_metric_name(name: &str) -> &str {
    TRIMMABLE_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix).filter(|base| !base.is_empty()))
        .unwrap_or(name)
}

/// Returns `true` if a series with `suffix` is a component of a family of the given type.
///
/// `_created` carries the start time of any family.
fn has_component(ty: MetricType, suffix: &str) -> bool {
    match (ty, suffix) {
        (_, "_created") => true,
        (MetricType::Counter, "_total") => true,
        (MetricType::Info, "_info") => true,
        (MetricType::Histogram, "_bucket" | "_sum" | "_count") => true,
        (MetricType::Summary, "_sum" | "_count") => true,
        _ => false,
    }
}

/// Looks up the metadata of the family a metric belongs to.
///
/// Metrics synthesized by the scraper and metrics with metadata of their own keep their name.
/// Otherwise, the metadata of the normalized name is used if the trimmed suffix is a component
/// series of that type. The `metric` field of the returned metadata is the resolved family name.
pub fn resolve_metadata(metric_name: &str, store: Option<&dyn MetadataStore>) -> MetricMetadata {
    if let Some(metadata) = internal_metadata(metric_name) {
        return metadata;
    }

    let lookup = |name: &str| {
        let metadata = store?.metadata(name)?;
        Some(MetricMetadata {
            metric: name.to_owned(),
            ..metadata
        })
    };

    let normalized = normalize_metric_name(metric_name);
    let suffix = &metric_name[normalized.len()..];

    lookup(metric_name)
        .or_else(|| lookup(normalized).filter(|metadata| has_component(metadata.ty, suffix)))
        .unwrap_or_else(|| MetricMetadata::new(metric_name, MetricType::Unknown))
}

/// The output shape of a metric family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    /// Values that can go up and down.
    Gauge,
    /// Cumulative sums.
    Sum {
        /// Whether the sum only ever increases.
        monotonic: bool,
    },
    /// Cumulative bucketed distributions.
    Histogram,
    /// Cumulative quantile summaries.
    Summary,
}

impl MetricKind {
    /// Maps an announced metric type to its output shape.
    pub fn from_type(ty: MetricType) -> Self {
        match ty {
            MetricType::Counter => Self::Sum { monotonic: true },
            MetricType::Info | MetricType::StateSet => Self::Sum { monotonic: false },
            MetricType::Histogram => Self::Histogram,
            MetricType::Summary => Self::Summary,
            MetricType::Gauge | MetricType::GaugeHistogram | MetricType::Unknown => Self::Gauge,
        }
    }

    /// Returns the label distinguishing the component series within one group.
    pub fn boundary_label(self) -> Option<&'static str> {
        match self {
            Self::Histogram => Some(BUCKET_LABEL),
            Self::Summary => Some(QUANTILE_LABEL),
            Self::Gauge | Self::Sum { .. } => None,
        }
    }
}

/// Order-independent identity of a series within a family.
///
/// Built from the label pairs in name order, leaving out the metric name, the resource labels
/// and the family's boundary label. Labels with empty values are equal to absent labels and are
/// left out as well.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GroupKey(Vec<u8>);

impl GroupKey {
    /// Computes the group key of a label set.
    pub fn new(labels: &Labels, boundary_label: Option<&str>) -> Self {
        let mut key = Vec::new();
        for label in group_labels(labels, boundary_label) {
            key.extend_from_slice(label.name.as_bytes());
            key.push(KEY_SEPARATOR);
            key.extend_from_slice(label.value.as_bytes());
            key.push(KEY_SEPARATOR);
        }
        Self(key)
    }
}

fn group_labels<'a>(
    labels: &'a Labels,
    boundary_label: Option<&'a str>,
) -> impl Iterator<Item = &'a Label> + 'a {
    labels.iter().filter(move |label| {
        !label.value.is_empty()
            && !matches!(
                label.name.as_str(),
                METRIC_NAME_LABEL | JOB_LABEL | INSTANCE_LABEL
            )
            && Some(label.name.as_str()) != boundary_label
    })
}

/// The role of a sample within its group.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Component {
    Value,
    Created,
    Sum,
    Count,
    Boundary(f64),
}

impl Component {
    fn classify(
        kind: MetricKind,
        family: &str,
        metric_name: &str,
        labels: &Labels,
    ) -> Result<Self, LabelError> {
        let suffix = metric_name.strip_prefix(family).unwrap_or_default();

        let label = match (kind, suffix) {
            (_, "_created") => return Ok(Self::Created),
            (MetricKind::Gauge | MetricKind::Sum { .. }, _) => return Ok(Self::Value),
            (_, "_sum") => return Ok(Self::Sum),
            (_, "_count") => return Ok(Self::Count),
            (MetricKind::Histogram, _) => BUCKET_LABEL,
            (MetricKind::Summary, _) => QUANTILE_LABEL,
        };

        let value = labels.get(label).ok_or_else(|| LabelError::MissingBoundary {
            label,
            metric: metric_name.to_owned(),
        })?;

        value
            .parse()
            .map(Self::Boundary)
            .map_err(|_| LabelError::InvalidBoundary {
                label,
                metric: metric_name.to_owned(),
                value: value.to_owned(),
            })
    }
}

/// Maps exemplar values to map keys, treating both zeros as equal.
fn value_key(value: f64) -> u64 {
    if value == 0.0 { 0 } else { value.to_bits() }
}

/// Converts a float count into an integer count, saturating at zero.
fn to_count(value: f64) -> u64 {
    value as u64
}

#[derive(Clone, Copy, Debug)]
struct Sample {
    timestamp_ms: i64,
    value: f64,
}

#[derive(Clone, Debug)]
struct Distribution {
    timestamp_ms: i64,
    boundaries: Vec<(f64, f64)>,
    sum: Option<f64>,
    count: Option<f64>,
    stale: bool,
}

impl Distribution {
    fn new(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            boundaries: Vec::new(),
            sum: None,
            count: None,
            stale: false,
        }
    }

    fn record(&mut self, component: Component, value: f64) {
        if is_stale_marker(value) {
            self.stale = true;
            return;
        }

        match component {
            Component::Sum => self.sum = Some(value),
            Component::Count => self.count = Some(value),
            Component::Boundary(bound) => {
                match self.boundaries.iter_mut().find(|(b, _)| *b == bound) {
                    Some(entry) => entry.1 = value,
                    None => self.boundaries.push((bound, value)),
                }
            }
            Component::Value | Component::Created => (),
        }
    }

    fn sorted_boundaries(&self) -> Vec<(f64, f64)> {
        let mut boundaries = self.boundaries.clone();
        boundaries.sort_by(|a, b| a.0.total_cmp(&b.0));
        boundaries
    }
}

#[derive(Clone, Debug)]
enum GroupValues {
    Number(Vec<Sample>),
    Histogram(Distribution),
    Summary(Distribution),
}

/// The samples of one label combination within a [`MetricFamily`].
#[derive(Clone, Debug)]
pub struct MetricGroup {
    attributes: Attributes,
    created: Option<f64>,
    values: GroupValues,
    exemplars: IndexMap<u64, Exemplar>,
}

impl MetricGroup {
    fn new(kind: MetricKind, labels: &Labels, timestamp_ms: i64) -> Self {
        let attributes = group_labels(labels, kind.boundary_label())
            .map(|label| (label.name.clone(), label.value.clone()))
            .collect();

        let values = match kind {
            MetricKind::Gauge | MetricKind::Sum { .. } => GroupValues::Number(Vec::new()),
            MetricKind::Histogram => GroupValues::Histogram(Distribution::new(timestamp_ms)),
            MetricKind::Summary => GroupValues::Summary(Distribution::new(timestamp_ms)),
        };

        Self {
            attributes,
            created: None,
            values,
            exemplars: IndexMap::new(),
        }
    }

    /// Returns the attributes shared by all points of this group.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Returns the exemplar recorded for the given value.
    pub fn exemplar(&self, value: f64) -> Option<&Exemplar> {
        self.exemplars.get(&value_key(value))
    }

    /// Iterates over all exemplars in the order they were first recorded.
    pub fn exemplars(&self) -> impl Iterator<Item = &Exemplar> {
        self.exemplars.values()
    }

    fn check_timestamp(&self, metric_name: &str, timestamp_ms: i64) -> Result<(), TransactionError> {
        match &self.values {
            GroupValues::Histogram(dist) | GroupValues::Summary(dist)
                if dist.timestamp_ms != timestamp_ms =>
            {
                Err(TransactionError::InconsistentTimestamps {
                    metric: metric_name.to_owned(),
                })
            }
            _ => Ok(()),
        }
    }

    fn record(&mut self, component: Component, timestamp_ms: i64, value: f64) {
        if component == Component::Created {
            if !is_stale_marker(value) {
                self.created = Some(value);
            }
            return;
        }

        match &mut self.values {
            GroupValues::Number(samples) => match samples.last_mut() {
                Some(last) if last.timestamp_ms == timestamp_ms => last.value = value,
                _ => samples.push(Sample {
                    timestamp_ms,
                    value,
                }),
            },
            GroupValues::Histogram(dist) | GroupValues::Summary(dist) => {
                dist.record(component, value)
            }
        }
    }

    /// Returns `true` if an exemplar with the given value can be attached to this group.
    fn matches(&self, value: f64) -> bool {
        match &self.values {
            GroupValues::Number(samples) => samples.iter().any(|sample| sample.value == value),
            GroupValues::Histogram(dist) => dist.boundaries.iter().any(|(bound, _)| *bound >= value),
            GroupValues::Summary(_) => false,
        }
    }

    fn start_time(&self) -> u64 {
        self.created.map(seconds_to_nanos).unwrap_or_default()
    }

    fn number_points(&self, cumulative: bool) -> Vec<NumberPoint> {
        let GroupValues::Number(samples) = &self.values else {
            return Vec::new();
        };

        let start_time_unix_nano = if cumulative { self.start_time() } else { 0 };

        samples
            .iter()
            .map(|sample| {
                let stale = is_stale_marker(sample.value);
                let exemplars = if stale {
                    Vec::new()
                } else {
                    self.exemplars
                        .values()
                        .filter(|exemplar| value_key(exemplar.value) == value_key(sample.value))
                        .cloned()
                        .collect()
                };

                NumberPoint {
                    attributes: self.attributes.clone(),
                    start_time_unix_nano,
                    time_unix_nano: millis_to_nanos(sample.timestamp_ms),
                    value: if stale { 0.0 } else { sample.value },
                    no_recorded_value: stale,
                    exemplars,
                }
            })
            .collect()
    }

    fn into_histogram_point(self, metric: &str) -> Option<HistogramPoint> {
        let start_time_unix_nano = self.start_time();
        let GroupValues::Histogram(dist) = self.values else {
            return None;
        };

        let time_unix_nano = millis_to_nanos(dist.timestamp_ms);
        if dist.stale {
            return Some(HistogramPoint {
                attributes: self.attributes,
                start_time_unix_nano,
                time_unix_nano,
                no_recorded_value: true,
                ..Default::default()
            });
        }

        let Some(count) = dist.count else {
            scrape_log::debug!(metric, "dropping histogram series without _count");
            return None;
        };

        let boundaries = dist.sorted_boundaries();
        let mut explicit_bounds = Vec::with_capacity(boundaries.len());
        let mut bucket_counts = Vec::with_capacity(boundaries.len() + 1);
        let mut previous = 0.0;

        for (bound, cumulative) in boundaries {
            if bound == f64::INFINITY {
                continue;
            }
            explicit_bounds.push(bound);
            bucket_counts.push(to_count(cumulative - previous));
            previous = cumulative;
        }
        bucket_counts.push(to_count(count - previous));

        Some(HistogramPoint {
            attributes: self.attributes,
            start_time_unix_nano,
            time_unix_nano,
            count: to_count(count),
            sum: dist.sum,
            bucket_counts,
            explicit_bounds,
            no_recorded_value: false,
            exemplars: self.exemplars.into_values().collect(),
        })
    }

    fn into_summary_point(self, metric: &str) -> Option<SummaryPoint> {
        let start_time_unix_nano = self.start_time();
        let GroupValues::Summary(dist) = self.values else {
            return None;
        };

        let time_unix_nano = millis_to_nanos(dist.timestamp_ms);
        if dist.stale {
            return Some(SummaryPoint {
                attributes: self.attributes,
                start_time_unix_nano,
                time_unix_nano,
                no_recorded_value: true,
                ..Default::default()
            });
        }

        let Some(count) = dist.count else {
            scrape_log::debug!(metric, "dropping summary series without _count");
            return None;
        };

        let quantile_values = dist
            .sorted_boundaries()
            .into_iter()
            .map(|(quantile, value)| Quantile { quantile, value })
            .collect();

        Some(SummaryPoint {
            attributes: self.attributes,
            start_time_unix_nano,
            time_unix_nano,
            count: to_count(count),
            sum: dist.sum.unwrap_or_default(),
            quantile_values,
            no_recorded_value: false,
        })
    }
}

/// All series of one metric within a scrape.
#[derive(Clone, Debug)]
pub struct MetricFamily {
    metadata: MetricMetadata,
    kind: MetricKind,
    groups: IndexMap<GroupKey, MetricGroup>,
}

impl MetricFamily {
    /// Creates an empty family from resolved metadata.
    ///
    /// The family is named after `metadata.metric`, see [`resolve_metadata`].
    pub fn new(metadata: MetricMetadata) -> Self {
        Self {
            kind: MetricKind::from_type(metadata.ty),
            metadata,
            groups: IndexMap::new(),
        }
    }

    /// Returns the family name.
    pub fn name(&self) -> &str {
        &self.metadata.metric
    }

    /// Returns the output shape of this family.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Returns the metadata this family was created from.
    pub fn metadata(&self) -> &MetricMetadata {
        &self.metadata
    }

    /// Computes the key of the group a label set belongs to.
    pub fn group_key(&self, labels: &Labels) -> GroupKey {
        GroupKey::new(labels, self.kind.boundary_label())
    }

    /// Returns the group with the given key.
    pub fn group(&self, key: &GroupKey) -> Option<&MetricGroup> {
        self.groups.get(key)
    }

    /// Iterates over all groups in the order they were created.
    pub fn groups(&self) -> impl Iterator<Item = (&GroupKey, &MetricGroup)> {
        self.groups.iter()
    }

    /// Returns `true` if no sample has been added.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Adds a sample to the group of its label set.
    ///
    /// The sample is validated completely before anything is recorded. On error, the family is
    /// left unchanged.
    pub fn add(
        &mut self,
        metric_name: &str,
        labels: &Labels,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<(), TransactionError> {
        let kind = self.kind;
        let component = Component::classify(kind, self.name(), metric_name, labels)?;
        let key = self.group_key(labels);

        if let Some(group) = self.groups.get(&key) {
            group.check_timestamp(metric_name, timestamp_ms)?;
        }

        self.groups
            .entry(key)
            .or_insert_with(|| MetricGroup::new(kind, labels, timestamp_ms))
            .record(component, timestamp_ms, value);

        Ok(())
    }

    /// Attaches an exemplar to the group of its label set.
    ///
    /// Fails with [`TransactionError::NoMatchingSample`] if no sample of the group matches the
    /// exemplar's value. An earlier exemplar with the same value is replaced.
    pub fn add_exemplar(
        &mut self,
        metric_name: &str,
        labels: &Labels,
        exemplar: Exemplar,
    ) -> Result<(), TransactionError> {
        let key = self.group_key(labels);

        match self.groups.get_mut(&key) {
            Some(group) if group.matches(exemplar.value) => {
                group.exemplars.insert(value_key(exemplar.value), exemplar);
                Ok(())
            }
            _ => Err(TransactionError::NoMatchingSample {
                metric: metric_name.to_owned(),
                value: exemplar.value,
            }),
        }
    }

    /// Converts this family into an output metric.
    ///
    /// Returns `None` if no group produced a data point.
    pub fn into_metric(self) -> Option<Metric> {
        let Self {
            metadata,
            kind,
            groups,
        } = self;
        let name = metadata.metric;

        let data = match kind {
            MetricKind::Gauge => MetricData::Gauge {
                points: groups
                    .values()
                    .flat_map(|group| group.number_points(false))
                    .collect(),
            },
            MetricKind::Sum { monotonic } => MetricData::Sum {
                monotonic,
                points: groups
                    .values()
                    .flat_map(|group| group.number_points(true))
                    .collect(),
            },
            MetricKind::Histogram => MetricData::Histogram {
                points: groups
                    .into_values()
                    .filter_map(|group| group.into_histogram_point(&name))
                    .collect(),
            },
            MetricKind::Summary => MetricData::Summary {
                points: groups
                    .into_values()
                    .filter_map(|group| group.into_summary_point(&name))
                    .collect(),
            },
        };

        if data.is_empty() {
            scrape_log::debug!(metric = %name, "dropping metric without data points");
            return None;
        }

        Some(Metric {
            name,
            description: metadata.help,
            unit: metadata.unit,
            data,
        })
    }
}
