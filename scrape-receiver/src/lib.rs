//! Ingestion of scraped samples into resource-tagged metric batches.
//!
//! A scrape scheduler parses the payload of one scrape into samples and hands them to a
//! [`Transaction`], which implements the [`Appender`] protocol:
//!
//! 1. [`append`](Appender::append) for every sample. Samples are validated against the scraped
//!    [`Target`] and grouped into metric families by name and into groups by label set.
//! 2. [`append_exemplar`](Appender::append_exemplar) for every sample carrying an exemplar.
//! 3. [`commit`](Appender::commit) to emit one [`MetricsBatch`] to the [`MetricsConsumer`], or
//!    [`rollback`](Appender::rollback) to discard the scrape.
//!
//! Errors of a single append drop the sample and leave the transaction usable. Only commit can
//! fail the whole scrape, either because the scrape did not report its start time or because the
//! consumer rejected the batch.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use scrape_receiver::{
//!     Appender, MetricsSink, ScrapeContext, SeriesRef, Target, Transaction, labels,
//! };
//!
//! let target = Target::new(labels! { "instance" => "localhost:8080" }, labels! {});
//! let sink = MetricsSink::new();
//!
//! let mut transaction = Transaction::new(
//!     ScrapeContext::new(Arc::new(target)),
//!     Arc::default(),
//!     Arc::new(sink.clone()),
//! );
//!
//! for (name, value) in [("process_start_time_seconds", 1.66e9), ("up", 1.0)] {
//!     let labels = labels! {
//!         "__name__" => name,
//!         "job" => "api",
//!         "instance" => "localhost:8080",
//!     };
//!     transaction.append(SeriesRef(0), &labels, 1_660_233_371_385, value).unwrap();
//! }
//!
//! transaction.commit().unwrap();
//! assert_eq!(sink.all_metrics()[0].resource.job, "api");
//! ```

#![warn(missing_docs)]

mod batch;
mod builder;
mod config;
mod consumer;
mod error;
mod exemplar;
mod family;
mod labels;
mod metadata;
mod otlp;
mod resource;
mod start_time;
mod target;
mod transaction;
mod utils;

pub use self::batch::*;
pub use self::builder::MetricBuilder;
pub use self::config::{MetricPattern, TransactionConfig};
pub use self::consumer::{ConsumeError, MetricsConsumer, MetricsSink, NopConsumer};
pub use self::error::{LabelError, TransactionError};
pub use self::exemplar::{Exemplar, RawExemplar, SPAN_ID_LABEL, SpanId, TRACE_ID_LABEL, TraceId};
pub use self::family::{
    GroupKey, MetricFamily, MetricGroup, MetricKind, normalize_metric_name, resolve_metadata,
};
pub use self::labels::*;
pub use self::metadata::{MetadataStore, MetricMetadata, MetricType, internal_metadata};
pub use self::resource::*;
pub use self::start_time::{DEFAULT_START_TIME_METRIC, StartTimeTracker};
pub use self::target::{ScrapeContext, ScrapeIdentity, Target, TargetError};
pub use self::transaction::{Appender, SeriesRef, Transaction};
pub use self::utils::{STALE_NAN_BITS, is_stale_marker};

pub use opentelemetry_proto::tonic::metrics::v1 as otel_metrics;
