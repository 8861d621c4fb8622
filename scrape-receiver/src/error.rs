use thiserror::Error;

use crate::consumer::ConsumeError;
use crate::target::TargetError;

/// Reason why the labels of a sample were rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    /// The `__name__` label is missing or empty.
    #[error("metric name label is missing")]
    MissingMetricName,
    /// A label name occurs more than once.
    #[error("duplicate label {0:?}")]
    DuplicateLabel(String),
    /// A histogram bucket or summary quantile sample lacks its boundary label.
    #[error("{label:?} label is missing on {metric}")]
    MissingBoundary {
        /// The boundary label, `le` or `quantile`.
        label: &'static str,
        /// The metric name of the sample.
        metric: String,
    },
    /// The boundary label of a sample is not a number.
    #[error("{label:?} label of {metric} is not a number: {value:?}")]
    InvalidBoundary {
        /// The boundary label, `le` or `quantile`.
        label: &'static str,
        /// The metric name of the sample.
        metric: String,
        /// The unparsable value.
        value: String,
    },
}

/// Any error that may occur while appending to or committing a transaction.
///
/// All errors except for [`MissingStartTime`](Self::MissingStartTime) and
/// [`Consumer`](Self::Consumer) concern a single append. The transaction remains usable after
/// them and the rejected sample is dropped.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The sample's labels are invalid.
    #[error("invalid labels: {0}")]
    InvalidLabels(#[from] LabelError),
    /// The sample's job or instance does not belong to the scraped target.
    #[error("target not found: {0}")]
    TargetNotFound(#[from] TargetError),
    /// An exemplar refers to a series or value that has not been appended.
    #[error("no sample of {metric} matches exemplar value {value}")]
    NoMatchingSample {
        /// The metric name of the exemplar.
        metric: String,
        /// The exemplar value.
        value: f64,
    },
    /// Component series of a histogram or summary were scraped at different times.
    #[error("inconsistent timestamps on metric points for metric {metric}")]
    InconsistentTimestamps {
        /// The metric name of the rejected sample.
        metric: String,
    },
    /// Samples were appended, but the start time metric was not among them.
    #[error("process_start_time_seconds metric is missing")]
    MissingStartTime,
    /// The consumer rejected the batch.
    #[error(transparent)]
    Consumer(#[from] ConsumeError),
}
