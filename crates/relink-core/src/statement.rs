//! Driver options attached to a prepared statement

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Driver-specific options for `prepare`.
///
/// Backed by an ordered map so that two option sets with the same entries
/// always serialize identically, whatever order they were inserted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatementOptions(BTreeMap<String, String>);

impl StatementOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StatementOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_ignores_insertion_order() {
        let a = StatementOptions::new().with("scrollable", "true").with("fetch", "50");
        let b = StatementOptions::new().with("fetch", "50").with("scrollable", "true");

        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_from_iterator() {
        let opts: StatementOptions = [("timeout", "5")].into_iter().collect();
        assert_eq!(opts.get("timeout"), Some("5"));
        assert!(!opts.is_empty());
        assert!(StatementOptions::new().is_empty());
    }
}
