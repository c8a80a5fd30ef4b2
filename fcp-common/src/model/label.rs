//! Fault labels and the label message exchanged with the evaluation system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Fault class assigned to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    None,
    Electrical,
    Overheating,
}

impl LabelType {
    /// Every class, in class-index order
    pub const ALL: [LabelType; 3] = [LabelType::None, LabelType::Electrical, LabelType::Overheating];

    /// Output neuron index of this class
    pub fn index(self) -> usize {
        match self {
            LabelType::None => 0,
            LabelType::Electrical => 1,
            LabelType::Overheating => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LabelType::None => "none",
            LabelType::Electrical => "electrical",
            LabelType::Overheating => "overheating",
        }
    }
}

impl fmt::Display for LabelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(LabelType::None),
            "electrical" => Ok(LabelType::Electrical),
            "overheating" => Ok(LabelType::Overheating),
            other => Err(Error::Schema(format!("Unknown label '{}'", other))),
        }
    }
}

/// Session identifier; producers send either integers or strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionId {
    Number(i64),
    Text(String),
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Number(n) => write!(f, "{}", n),
            SessionId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId::Text(s.to_string())
    }
}

impl From<i64> for SessionId {
    fn from(n: i64) -> Self {
        SessionId::Number(n)
    }
}

/// `{UUID, label, timestamp?}` body of `/label/classifier` and `/label/expert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelMessage {
    #[serde(rename = "UUID")]
    pub uuid: SessionId,
    pub label: LabelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label_index_round_trip() {
        for label in LabelType::ALL {
            assert_eq!(LabelType::from_index(label.index()), Some(label));
        }
        assert_eq!(LabelType::from_index(3), None);
    }

    #[test]
    fn test_label_parse_is_case_insensitive() {
        assert_eq!("Overheating".parse::<LabelType>().unwrap(), LabelType::Overheating);
        assert!("melting".parse::<LabelType>().is_err());
    }

    #[test]
    fn test_label_message_accepts_numeric_uuid() {
        let msg: LabelMessage = serde_json::from_value(json!({"UUID": 17, "label": "electrical"})).unwrap();
        assert_eq!(msg.uuid, SessionId::Number(17));
        assert_eq!(msg.label, LabelType::Electrical);
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_label_message_rejects_unknown_fields_and_labels() {
        assert!(serde_json::from_value::<LabelMessage>(
            json!({"UUID": "a", "label": "none", "extra": 1})
        )
        .is_err());
        assert!(serde_json::from_value::<LabelMessage>(json!({"UUID": "a", "label": "fire"})).is_err());
    }
}
