use std::{collections::BTreeSet, fmt};

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ReportCardError, Result};

/// Ordered set of class labels with a dense index per label.
///
/// Indices follow the ascending sort order of the label strings. The space is
/// built from training labels only and reused unchanged for validation and test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSpace {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelSpace {
    /// Build a label space from observed labels (duplicates allowed).
    pub fn from_labels<I, S>(observed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = observed
            .into_iter()
            .map(|label| label.as_ref().to_owned())
            .collect();
        Self::from_sorted(unique.into_iter().collect())
    }

    fn from_sorted(labels: Vec<String>) -> Self {
        let index = labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), idx))
            .collect();
        Self { labels, index }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    #[must_use]
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Map every label to its index, failing on labels outside the space.
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|label| {
                let label = label.as_ref();
                self.index_of(label)
                    .ok_or_else(|| ReportCardError::UnknownLabel(label.to_owned()))
            })
            .collect()
    }

    /// Map indices back to label strings.
    pub fn decode(&self, indices: &[usize]) -> Result<Vec<String>> {
        indices
            .iter()
            .map(|&index| {
                self.label(index)
                    .map(str::to_owned)
                    .ok_or(ReportCardError::LabelIndexOutOfRange {
                        index,
                        n_labels: self.len(),
                    })
            })
            .collect()
    }
}

impl From<Vec<String>> for LabelSpace {
    fn from(labels: Vec<String>) -> Self {
        Self::from_labels(labels)
    }
}

impl From<LabelSpace> for Vec<String> {
    fn from(space: LabelSpace) -> Self {
        space.labels
    }
}

impl PartialEq for LabelSpace {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for LabelSpace {}

impl fmt::Display for LabelSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.labels.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_follow_sorted_order() {
        let space = LabelSpace::from_labels(["human", "ai", "edited", "ai"]);
        assert_eq!(space.labels(), &["ai", "edited", "human"]);
        assert_eq!(space.index_of("ai"), Some(0));
        assert_eq!(space.index_of("human"), Some(2));
        assert_eq!(space.len(), 3);
    }

    #[test]
    fn test_round_trip() {
        let space = LabelSpace::from_labels(["human", "ai", "edited"]);
        let observed = vec!["edited", "human", "human", "ai"];
        let encoded = space.encode(&observed).unwrap();
        assert_eq!(encoded, vec![1, 2, 2, 0]);
        assert_eq!(space.decode(&encoded).unwrap(), observed);
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let space = LabelSpace::from_labels(["ai", "human"]);
        let err = space.encode(&["robot"]).unwrap_err();
        assert!(matches!(err, ReportCardError::UnknownLabel(label) if label == "robot"));
    }

    #[test]
    fn test_decode_out_of_range() {
        let space = LabelSpace::from_labels(["ai", "human"]);
        assert!(matches!(
            space.decode(&[2]),
            Err(ReportCardError::LabelIndexOutOfRange { index: 2, n_labels: 2 })
        ));
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let space = LabelSpace::from_labels(["human", "ai"]);
        let json = serde_json::to_string(&space).unwrap();
        assert_eq!(json, r#"["ai","human"]"#);
        let back: LabelSpace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, space);
    }
}
