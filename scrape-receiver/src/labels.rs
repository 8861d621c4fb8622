//! Label sets attached to scraped samples.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label holding the name of the metric a sample belongs to.
pub const METRIC_NAME_LABEL: &str = "__name__";
/// Label holding the job name of the scrape target.
pub const JOB_LABEL: &str = "job";
/// Label holding the `host:port` instance address of the scrape target.
pub const INSTANCE_LABEL: &str = "instance";
/// Discovery label holding the scheme used to scrape the target.
pub const SCHEME_LABEL: &str = "__scheme__";
/// Discovery label holding the address of the scrape target.
pub const ADDRESS_LABEL: &str = "__address__";
/// Label holding the upper bound of a histogram bucket.
pub const BUCKET_LABEL: &str = "le";
/// Label holding the quantile of a summary.
pub const QUANTILE_LABEL: &str = "quantile";

/// A single `name=value` pair of a [`Labels`] set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct Label {
    /// The label name.
    pub name: String,
    /// The label value.
    pub value: String,
}

impl Label {
    /// Creates a new label.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A set of labels identifying a time series, sorted by label name.
///
/// The set is sorted on construction, so two sets built from the same pairs in different order
/// compare equal. Duplicate names are retained so that they can be rejected explicitly, see
/// [`Labels::duplicate_name`].
///
/// # Example
///
/// ```
/// use scrape_receiver::labels;
///
/// let labels = labels! {
///     "__name__" => "http_requests_total",
///     "job" => "api",
/// };
///
/// assert_eq!(labels.get("job"), Some("api"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "Vec<Label>")]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Creates a label set from the given labels.
    pub fn new(mut labels: Vec<Label>) -> Self {
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        Self(labels)
    }

    /// Returns the value of the label with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.value.as_str())
    }

    /// Returns `true` if the set contains a label with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of labels in this set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set contains no labels.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the labels in name order.
    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.0.iter()
    }

    /// Returns the first label name that occurs more than once.
    pub fn duplicate_name(&self) -> Option<&str> {
        self.0
            .windows(2)
            .find(|pair| pair[0].name == pair[1].name)
            .map(|pair| pair[0].name.as_str())
    }

    /// Removes all labels with an empty value.
    ///
    /// An empty label value is equivalent to the label being absent.
    pub fn without_empty(mut self) -> Self {
        self.0.retain(|label| !label.value.is_empty());
        self
    }

    /// Adds the given labels unless the set already has a label of the same name.
    pub fn with_defaults(mut self, defaults: &BTreeMap<String, String>) -> Self {
        let missing: Vec<_> = defaults
            .iter()
            .filter(|(name, _)| !self.contains(name))
            .map(|(name, value)| Label::new(name.as_str(), value.as_str()))
            .collect();

        if missing.is_empty() {
            return self;
        }

        self.0.extend(missing);
        Self::new(self.0)
    }
}

impl From<Vec<Label>> for Labels {
    fn from(labels: Vec<Label>) -> Self {
        Self::new(labels)
    }
}

impl<K, V> FromIterator<(K, V)> for Labels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| Label::new(k, v)).collect())
    }
}

impl IntoIterator for Labels {
    type Item = Label;
    type IntoIter = std::vec::IntoIter<Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, label) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        f.write_str("}")
    }
}

/// Creates a [`Labels`] set from `name => value` pairs.
///
/// # Example
///
/// ```
/// let labels = scrape_receiver::labels! { "job" => "test", "instance" => "localhost:8080" };
/// assert_eq!(labels.len(), 2);
/// ```
#[macro_export]
macro_rules! labels {
    ($($name:expr => $value:expr),* $(,)?) => {
        $crate::Labels::new(vec![$($crate::Label::new($name, $value)),*])
    };
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_sorted_on_construction() {
        let a = labels! { "job" => "test", "__name__" => "foo", "instance" => "a:1" };
        let b = labels! { "instance" => "a:1", "job" => "test", "__name__" => "foo" };
        assert_eq!(a, b);
        assert_eq!(a.to_string(), r#"{__name__="foo", instance="a:1", job="test"}"#);
    }

    #[test]
    fn test_duplicate_name() {
        let labels = labels! { "a" => "1", "b" => "2", "a" => "3" };
        assert_eq!(labels.duplicate_name(), Some("a"));
        assert_eq!(labels! { "a" => "1" }.duplicate_name(), None);
    }

    #[test]
    fn test_without_empty() {
        let labels = labels! { "a" => "", "b" => "2" }.without_empty();
        assert_eq!(labels, labels! { "b" => "2" });
    }

    #[test]
    fn test_with_defaults_keeps_existing() {
        let defaults = BTreeMap::from([
            ("cluster".to_owned(), "eu".to_owned()),
            ("job".to_owned(), "other".to_owned()),
        ]);

        let labels = labels! { "job" => "test" }.with_defaults(&defaults);
        assert_eq!(labels, labels! { "cluster" => "eu", "job" => "test" });
    }

    #[test]
    fn test_deserialize_sorts() {
        let labels: Labels =
            serde_json::from_str(r#"[{"name":"z","value":"1"},{"name":"a","value":"2"}]"#)
                .unwrap();
        assert_eq!(labels.iter().next().map(|l| l.name.as_str()), Some("a"));
    }
}
