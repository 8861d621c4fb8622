use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::labels::{ADDRESS_LABEL, INSTANCE_LABEL, JOB_LABEL, Labels};
use crate::metadata::MetadataStore;

/// Reason why a label set could not be matched against the bound [`Target`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    /// The sample does not carry a job or instance label.
    #[error("sample has no {0} label")]
    MissingLabel(&'static str),
    /// The sample's job or instance differs from the target or from earlier samples.
    #[error("{label} {value:?} does not match {expected:?}")]
    Mismatch {
        /// The mismatching label, either `job` or `instance`.
        label: &'static str,
        /// The value carried by the sample.
        value: String,
        /// The value expected by the target.
        expected: String,
    },
}

/// A scrape target as seen by the scheduler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Target {
    /// Labels before relabeling, including `__meta_*` discovery metadata.
    pub discovered: Labels,
    /// Labels after relabeling.
    pub processed: Labels,
}

impl Target {
    /// Creates a target from its processed and discovered label sets.
    pub fn new(processed: Labels, discovered: Labels) -> Self {
        Self {
            discovered,
            processed,
        }
    }

    /// Returns the job name this target defines, if any.
    pub fn job(&self) -> Option<&str> {
        self.processed
            .get(JOB_LABEL)
            .or_else(|| self.discovered.get(JOB_LABEL))
    }

    /// Returns the instance this target defines, if any.
    ///
    /// Falls back to the discovered `__address__`, which becomes the instance unless relabeling
    /// assigned one explicitly.
    pub fn instance(&self) -> Option<&str> {
        self.processed
            .get(INSTANCE_LABEL)
            .or_else(|| self.discovered.get(INSTANCE_LABEL))
            .or_else(|| self.discovered.get(ADDRESS_LABEL))
    }

    /// Validates the job and instance labels of a sample against this target.
    ///
    /// Both labels must be present. Where the target defines a value itself, the sample must carry
    /// the same value.
    pub fn identify(&self, labels: &Labels) -> Result<ScrapeIdentity, TargetError> {
        let job = labels
            .get(JOB_LABEL)
            .filter(|job| !job.is_empty())
            .ok_or(TargetError::MissingLabel(JOB_LABEL))?;
        let instance = labels
            .get(INSTANCE_LABEL)
            .filter(|instance| !instance.is_empty())
            .ok_or(TargetError::MissingLabel(INSTANCE_LABEL))?;

        check_label(JOB_LABEL, job, self.job())?;
        check_label(INSTANCE_LABEL, instance, self.instance())?;

        Ok(ScrapeIdentity {
            job: job.to_owned(),
            instance: instance.to_owned(),
        })
    }
}

fn check_label(
    label: &'static str,
    value: &str,
    expected: Option<&str>,
) -> Result<(), TargetError> {
    match expected {
        Some(expected) if expected != value => Err(TargetError::Mismatch {
            label,
            value: value.to_owned(),
            expected: expected.to_owned(),
        }),
        _ => Ok(()),
    }
}

/// The job and instance that samples of one transaction are attributed to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScrapeIdentity {
    /// The job name.
    pub job: String,
    /// The instance address.
    pub instance: String,
}

impl ScrapeIdentity {
    /// Ensures that another sample's identity matches this one.
    pub fn check(&self, other: &ScrapeIdentity) -> Result<(), TargetError> {
        check_label(JOB_LABEL, &other.job, Some(&self.job))?;
        check_label(INSTANCE_LABEL, &other.instance, Some(&self.instance))
    }
}

/// Execution context of one scrape, binding a transaction to its target.
#[derive(Clone)]
pub struct ScrapeContext {
    target: Arc<Target>,
    metadata: Option<Arc<dyn MetadataStore>>,
}

impl ScrapeContext {
    /// Creates a context for the given target without metric metadata.
    pub fn new(target: Arc<Target>) -> Self {
        Self {
            target,
            metadata: None,
        }
    }

    /// Attaches a metric metadata store used to determine metric types.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Returns the scrape target.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the metric metadata store, if any.
    pub fn metadata(&self) -> Option<&dyn MetadataStore> {
        self.metadata.as_deref()
    }
}

impl fmt::Debug for ScrapeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeContext")
            .field("target", &self.target)
            .field("metadata", &self.metadata.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::labels;

    fn target() -> Target {
        Target::new(
            labels! { "instance" => "localhost:8080" },
            labels! { "__address__" => "address:8080", "__scheme__" => "http" },
        )
    }

    #[test]
    fn test_identify() {
        let identity = target()
            .identify(&labels! { "instance" => "localhost:8080", "job" => "test" })
            .unwrap();

        assert_eq!(
            identity,
            ScrapeIdentity {
                job: "test".to_owned(),
                instance: "localhost:8080".to_owned(),
            }
        );
    }

    #[test]
    fn test_identify_missing_job() {
        let result = target().identify(&labels! { "instance" => "localhost:8080" });
        assert_eq!(result, Err(TargetError::MissingLabel("job")));
    }

    #[test]
    fn test_identify_instance_mismatch() {
        let result = target().identify(&labels! { "instance" => "other:9090", "job" => "test" });
        assert_eq!(
            result,
            Err(TargetError::Mismatch {
                label: "instance",
                value: "other:9090".to_owned(),
                expected: "localhost:8080".to_owned(),
            })
        );
    }

    #[test]
    fn test_instance_falls_back_to_address() {
        let target = Target::new(Labels::default(), labels! { "__address__" => "10.0.0.1:80" });
        assert_eq!(target.instance(), Some("10.0.0.1:80"));
        assert!(
            target
                .identify(&labels! { "instance" => "10.0.0.2:80", "job" => "a" })
                .is_err()
        );
    }

    #[test]
    fn test_identity_check() {
        let pinned = ScrapeIdentity {
            job: "test".to_owned(),
            instance: "localhost:8080".to_owned(),
        };
        let other = ScrapeIdentity {
            job: "test2".to_owned(),
            instance: "localhost:8080".to_owned(),
        };

        assert!(pinned.check(&pinned.clone()).is_ok());
        assert!(matches!(
            pinned.check(&other),
            Err(TargetError::Mismatch { label: "job", .. })
        ));
    }
}
