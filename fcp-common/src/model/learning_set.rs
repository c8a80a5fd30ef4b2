//! Learning set: the training/validation/test partition handed to development

use serde::{Deserialize, Serialize};

use super::{LabelType, PreparedSession, FEATURE_COUNT};

/// One `(features, label)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSetEntry {
    pub features: [f64; FEATURE_COUNT],
    pub label: LabelType,
}

impl LearningSetEntry {
    /// Returns None for unlabeled sessions, which cannot be learned from
    pub fn from_session(session: &PreparedSession) -> Option<Self> {
        session.label.map(|label| Self {
            features: session.features(),
            label,
        })
    }
}

/// Named split of a learning set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitKind {
    Training,
    Validation,
    Test,
}

impl SplitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitKind::Training => "training",
            SplitKind::Validation => "validation",
            SplitKind::Test => "test",
        }
    }
}

/// Three disjoint groupings of labeled sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningSet {
    pub training: Vec<LearningSetEntry>,
    pub validation: Vec<LearningSetEntry>,
    pub test: Vec<LearningSetEntry>,
}

impl LearningSet {
    pub fn split(&self, kind: SplitKind) -> &[LearningSetEntry] {
        match kind {
            SplitKind::Training => &self.training,
            SplitKind::Validation => &self.validation,
            SplitKind::Test => &self.test,
        }
    }

    /// Feature rows of one split
    pub fn features(&self, kind: SplitKind) -> Vec<[f64; FEATURE_COUNT]> {
        self.split(kind).iter().map(|e| e.features).collect()
    }

    /// Labels of one split, aligned with `features`
    pub fn labels(&self, kind: SplitKind) -> Vec<LabelType> {
        self.split(kind).iter().map(|e| e.label).collect()
    }

    /// True when every split holds at least one entry
    pub fn is_complete(&self) -> bool {
        !self.training.is_empty() && !self.validation.is_empty() && !self.test.is_empty()
    }

    pub fn len(&self) -> usize {
        self.training.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionId;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let body = json!({
            "training": [{"features": [1.0, 2.0, 3.0, 4.0, 5.0, 6.0], "label": "none"}],
            "validation": [{"features": [1.0, 2.0, 3.0, 4.0, 5.0, 6.0], "label": "electrical"}],
            "test": [{"features": [1.0, 2.0, 3.0, 4.0, 5.0, 6.0], "label": "overheating"}]
        });
        let set: LearningSet = serde_json::from_value(body).unwrap();
        assert!(set.is_complete());
        assert_eq!(set.len(), 3);
        assert_eq!(set.labels(SplitKind::Validation), vec![LabelType::Electrical]);
    }

    #[test]
    fn test_wrong_feature_arity_is_rejected() {
        let body = json!({
            "training": [{"features": [1.0, 2.0], "label": "none"}],
            "validation": [],
            "test": []
        });
        assert!(serde_json::from_value::<LearningSet>(body).is_err());
    }

    #[test]
    fn test_unlabeled_session_has_no_entry() {
        let session = PreparedSession::from_features(SessionId::Number(1), None, [0.0; FEATURE_COUNT]);
        assert!(LearningSetEntry::from_session(&session).is_none());
    }
}
