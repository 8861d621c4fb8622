use std::error::Error;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::batch::MetricsBatch;

/// An error returned by a [`MetricsConsumer`].
///
/// Wraps the consumer's own error type, which can be recovered with
/// [`downcast_ref`](Self::downcast_ref). Display and source are those of the wrapped error.
pub struct ConsumeError(Box<dyn Error + Send + Sync>);

impl ConsumeError {
    /// Creates a consume error from any error type.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self(error.into())
    }

    /// Returns the wrapped error if it is of type `E`.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for ConsumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ConsumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Error for ConsumeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

/// Receives the batches of committed transactions.
///
/// A consumer is shared by all transactions of a receiver and may be invoked concurrently.
pub trait MetricsConsumer: Send + Sync {
    /// Consumes a batch of metrics.
    fn consume(&self, batch: MetricsBatch) -> Result<(), ConsumeError>;
}

impl<F> MetricsConsumer for F
where
    F: Fn(MetricsBatch) -> Result<(), ConsumeError> + Send + Sync,
{
    fn consume(&self, batch: MetricsBatch) -> Result<(), ConsumeError> {
        self(batch)
    }
}

/// A consumer that discards all batches.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopConsumer;

impl MetricsConsumer for NopConsumer {
    fn consume(&self, _batch: MetricsBatch) -> Result<(), ConsumeError> {
        Ok(())
    }
}

/// A consumer that stores all batches in memory.
///
/// Clones share the same storage, so a sink can be handed to transactions while the original is
/// kept to inspect the results.
#[derive(Clone, Debug, Default)]
pub struct MetricsSink {
    batches: Arc<Mutex<Vec<MetricsBatch>>>,
}

impl MetricsSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all batches consumed so far.
    pub fn all_metrics(&self) -> Vec<MetricsBatch> {
        self.batches.lock().clone()
    }

    /// Returns the number of batches consumed so far.
    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    /// Returns `true` if no batch has been consumed.
    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }

    /// Removes and returns all consumed batches.
    pub fn take(&self) -> Vec<MetricsBatch> {
        std::mem::take(&mut *self.batches.lock())
    }
}

impl MetricsConsumer for MetricsSink {
    fn consume(&self, batch: MetricsBatch) -> Result<(), ConsumeError> {
        self.batches.lock().push(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_sink_clones_share_storage() {
        let sink = MetricsSink::new();
        let handle = sink.clone();

        handle.consume(MetricsBatch::default()).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.take().len(), 1);
        assert!(handle.is_empty());
    }

    #[test]
    fn test_closure_consumer() {
        let consumer = |_batch: MetricsBatch| -> Result<(), ConsumeError> {
            Err(ConsumeError::new("exporter queue is full"))
        };
        let error = consumer.consume(MetricsBatch::default()).unwrap_err();
        assert_eq!(error.to_string(), "exporter queue is full");
    }

    #[test]
    fn test_consume_error_downcast() {
        let error = ConsumeError::new(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        assert_eq!(
            error.downcast_ref::<io::Error>().map(io::Error::kind),
            Some(io::ErrorKind::BrokenPipe)
        );
        assert_eq!(error.to_string(), "closed");
    }
}
