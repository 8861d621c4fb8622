use std::sync::Arc;

use scrape_log::LogError;

use crate::batch::MetricsBatch;
use crate::builder::MetricBuilder;
use crate::config::TransactionConfig;
use crate::consumer::MetricsConsumer;
use crate::error::{LabelError, TransactionError};
use crate::exemplar::{Exemplar, RawExemplar};
use crate::family::MetricFamily;
use crate::labels::{Labels, METRIC_NAME_LABEL};
use crate::resource::Resource;
use crate::start_time::StartTimeTracker;
use crate::target::{ScrapeContext, ScrapeIdentity};
use crate::utils::{is_stale_marker, seconds_to_nanos};

/// The metric the scraper synthesizes to report the health of a scrape.
const SCRAPE_UP_METRIC: &str = "up";

/// Returns `true` if the sample is an `up` series reporting a failed scrape.
///
/// Staleness markers of `up` only announce that the series disappeared.
fn is_failed_scrape(metric_name: &str, value: f64) -> bool {
    metric_name == SCRAPE_UP_METRIC && value != 1.0 && !is_stale_marker(value)
}

/// Reference to a series, handed out by [`Appender::append`].
///
/// Series caching is not supported, the returned reference is always `0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SeriesRef(pub u64);

/// Receives the samples of one scrape.
///
/// An appender is used by one scrape on one thread. The scheduler calls [`append`](Self::append)
/// for every sample and [`append_exemplar`](Self::append_exemplar) for every sample with an
/// exemplar. It finishes the scrape with exactly one call to either [`commit`](Self::commit) or
/// [`rollback`](Self::rollback), both of which consume the appender.
pub trait Appender {
    /// The error returned by all operations.
    type Error;

    /// Appends a sample.
    ///
    /// On error, the sample is dropped and the appender remains usable.
    fn append(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<SeriesRef, Self::Error>;

    /// Appends an exemplar to a previously appended sample.
    fn append_exemplar(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        exemplar: RawExemplar,
    ) -> Result<SeriesRef, Self::Error>;

    /// Emits all appended samples.
    fn commit(self) -> Result<(), Self::Error>;

    /// Discards all appended samples.
    fn rollback(self) -> Result<(), Self::Error>;
}

/// Labels of a sample that passed validation.
struct ValidSample {
    metric_name: String,
    labels: Labels,
    identity: ScrapeIdentity,
}

/// Converts the samples of one scrape into a [`MetricsBatch`].
///
/// Samples are grouped into metric families as they are appended. Nothing is emitted until the
/// transaction is committed, at which point the complete batch is handed to the consumer at once.
pub struct Transaction {
    context: ScrapeContext,
    config: Arc<TransactionConfig>,
    consumer: Arc<dyn MetricsConsumer>,
    builder: MetricBuilder,
    start_time: StartTimeTracker,
    identity: Option<ScrapeIdentity>,
}

impl Transaction {
    /// Opens a transaction for a scrape of the target in `context`.
    pub fn new(
        context: ScrapeContext,
        config: Arc<TransactionConfig>,
        consumer: Arc<dyn MetricsConsumer>,
    ) -> Self {
        let start_time = StartTimeTracker::new(config.start_time_metric_regex.clone());

        Self {
            context,
            config,
            consumer,
            builder: MetricBuilder::new(),
            start_time,
            identity: None,
        }
    }

    /// Returns the family with the given name.
    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.builder.family(name)
    }

    /// Returns the start time recorded so far, in seconds.
    pub fn start_time(&self) -> Option<f64> {
        self.start_time.get()
    }

    /// Returns the job and instance all samples are attributed to.
    ///
    /// Pinned by the first accepted sample.
    pub fn identity(&self) -> Option<&ScrapeIdentity> {
        self.identity.as_ref()
    }

    fn validate(&self, labels: &Labels) -> Result<ValidSample, TransactionError> {
        let labels = labels
            .clone()
            .with_defaults(&self.config.external_labels)
            .without_empty();

        if let Some(name) = labels.duplicate_name() {
            return Err(LabelError::DuplicateLabel(name.to_owned()).into());
        }

        let metric_name = labels
            .get(METRIC_NAME_LABEL)
            .ok_or(LabelError::MissingMetricName)?
            .to_owned();

        let identity = self.context.target().identify(&labels)?;
        if let Some(pinned) = &self.identity {
            pinned.check(&identity)?;
        }

        Ok(ValidSample {
            metric_name,
            labels,
            identity,
        })
    }
}

impl Appender for Transaction {
    type Error = TransactionError;

    fn append(
        &mut self,
        _series: SeriesRef,
        labels: &Labels,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<SeriesRef, Self::Error> {
        let sample = self.validate(labels)?;

        self.builder.add_data_point(
            self.context.metadata(),
            &sample.metric_name,
            &sample.labels,
            timestamp_ms,
            value,
        )?;

        if is_failed_scrape(&sample.metric_name, value) {
            scrape_log::warn!(
                job = %sample.identity.job,
                instance = %sample.identity.instance,
                value,
                "scrape of target reported as failed"
            );
        }

        if !is_stale_marker(value) {
            self.start_time.observe(&sample.metric_name, value);
        }

        self.identity.get_or_insert(sample.identity);
        Ok(SeriesRef(0))
    }

    fn append_exemplar(
        &mut self,
        _series: SeriesRef,
        labels: &Labels,
        exemplar: RawExemplar,
    ) -> Result<SeriesRef, Self::Error> {
        let sample = self.validate(labels)?;

        self.builder.add_exemplar(
            self.context.metadata(),
            &sample.metric_name,
            &sample.labels,
            Exemplar::from(exemplar),
        )?;

        Ok(SeriesRef(0))
    }

    fn commit(self) -> Result<(), Self::Error> {
        let Some(identity) = self.identity else {
            scrape_log::debug!("no samples appended, nothing to commit");
            return Ok(());
        };

        let Some(start_time) = self.start_time.get() else {
            return Err(TransactionError::MissingStartTime);
        };

        let resource = Resource::new(&identity.job, &identity.instance, self.context.target());
        let metrics = self.builder.build(seconds_to_nanos(start_time));
        let batch = MetricsBatch { resource, metrics };

        let points = batch.point_count();
        if points == 0 {
            scrape_log::debug!(job = %identity.job, "scrape produced no data points");
            return Ok(());
        }

        scrape_log::debug!(
            job = %identity.job,
            instance = %identity.instance,
            metrics = batch.metrics.len(),
            points,
            "committing scraped metrics"
        );

        self.consumer.consume(batch).map_err(|error| {
            scrape_log::debug!("consumer rejected scraped metrics: {}", LogError(&error));
            TransactionError::Consumer(error)
        })
    }

    fn rollback(self) -> Result<(), Self::Error> {
        scrape_log::debug!(
            families = self.builder.families().count(),
            "rolling back scrape transaction"
        );
        Ok(())
    }
}
