use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// A regular expression matched against metric names.
///
/// Serialized as its source string. The pattern is not anchored: it matches if it is found
/// anywhere within the metric name, so use `^...$` to match complete names.
#[derive(Clone)]
pub struct MetricPattern(Regex);

impl MetricPattern {
    /// Compiles a pattern.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Returns `true` if the metric name matches this pattern.
    pub fn is_match(&self, metric_name: &str) -> bool {
        self.0.is_match(metric_name)
    }

    /// Returns the source string of this pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for MetricPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for MetricPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetricPattern({:?})", self.as_str())
    }
}

impl Serialize for MetricPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetricPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Self::new(&pattern).map_err(de::Error::custom)
    }
}

/// Configuration shared by all transactions of a receiver.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Additional metrics to use as the scrape's start time.
    ///
    /// `process_start_time_seconds` is always recognized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_metric_regex: Option<MetricPattern>,

    /// Labels added to every sample that does not carry a label of the same name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub external_labels: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let config: TransactionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TransactionConfig::default());
    }

    #[test]
    fn test_deserialize_pattern() {
        let config: TransactionConfig = serde_json::from_str(
            r#"{"start_time_metric_regex": "^.+_start_time$", "external_labels": {"cluster": "eu"}}"#,
        )
        .unwrap();

        let pattern = config.start_time_metric_regex.unwrap();
        assert!(pattern.is_match("jvm_start_time"));
        assert!(!pattern.is_match("jvm_start_time_seconds"));
        assert_eq!(config.external_labels["cluster"], "eu");
    }

    #[test]
    fn test_invalid_pattern() {
        let result = serde_json::from_str::<TransactionConfig>(r#"{"start_time_metric_regex": "("}"#);
        assert!(result.is_err());
    }
}
