//! Prepared session: the feature-extracted summary of one sensor interval

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{LabelType, SessionId};
use crate::{Error, Result};

/// Number of numeric features carried by a prepared session
pub const FEATURE_COUNT: usize = 6;

/// Feature names in feature-vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "mean_current",
    "mean_voltage",
    "mean_temperature",
    "mean_external_temperature",
    "mean_external_humidity",
    "mean_occupancy",
];

/// Short spellings some producers use for the external features
const FEATURE_ALIASES: [(&str, &str); 2] = [
    ("mean_external_temperature", "mean_ex_temperature"),
    ("mean_external_humidity", "mean_ex_humidity"),
];

/// Identifier keys accepted on the wire, first match wins
const ID_KEYS: [&str; 3] = ["uuid", "UUID", "id"];

/// Immutable prepared session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedSession {
    pub uuid: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelType>,
    pub mean_current: f64,
    pub mean_voltage: f64,
    pub mean_temperature: f64,
    pub mean_external_temperature: f64,
    pub mean_external_humidity: f64,
    pub mean_occupancy: f64,
}

impl PreparedSession {
    /// Validate a raw JSON body against the required-field/type table
    ///
    /// `label_required` is true for development and evaluation traffic; pure
    /// production inference carries no label.
    pub fn from_json(value: &Value, label_required: bool) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::Schema("Prepared session is not a JSON object".to_string()))?;

        let uuid = Self::parse_id(object)?;

        let label = match object.get("label") {
            None | Some(Value::Null) if label_required => {
                return Err(Error::Schema("Missing field: 'label'".to_string()));
            }
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.parse::<LabelType>()?),
            Some(other) => {
                return Err(Error::Schema(format!(
                    "Incorrect type for 'label': expected string, found {}",
                    json_type_name(other)
                )));
            }
        };

        let mut features = [0.0; FEATURE_COUNT];
        for (slot, name) in features.iter_mut().zip(FEATURE_NAMES) {
            *slot = Self::parse_feature(object, name)?;
        }

        Ok(Self::from_features(uuid, label, features))
    }

    /// Build a session from a feature vector in `FEATURE_NAMES` order
    pub fn from_features(uuid: SessionId, label: Option<LabelType>, features: [f64; FEATURE_COUNT]) -> Self {
        Self {
            uuid,
            label,
            mean_current: features[0],
            mean_voltage: features[1],
            mean_temperature: features[2],
            mean_external_temperature: features[3],
            mean_external_humidity: features[4],
            mean_occupancy: features[5],
        }
    }

    /// Feature vector in `FEATURE_NAMES` order
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [
            self.mean_current,
            self.mean_voltage,
            self.mean_temperature,
            self.mean_external_temperature,
            self.mean_external_humidity,
            self.mean_occupancy,
        ]
    }

    fn parse_id(object: &Map<String, Value>) -> Result<SessionId> {
        let (key, raw) = ID_KEYS
            .iter()
            .find_map(|k| object.get(*k).map(|v| (*k, v)))
            .ok_or_else(|| Error::Schema("Missing field: 'uuid'".to_string()))?;

        match raw {
            Value::String(s) if !s.is_empty() => Ok(SessionId::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(SessionId::Number).ok_or_else(|| {
                Error::Schema(format!("Incorrect type for '{}': expected integer", key))
            }),
            other => Err(Error::Schema(format!(
                "Incorrect type for '{}': expected string or integer, found {}",
                key,
                json_type_name(other)
            ))),
        }
    }

    fn parse_feature(object: &Map<String, Value>, name: &str) -> Result<f64> {
        let alias = FEATURE_ALIASES
            .iter()
            .find(|(canonical, _)| *canonical == name)
            .map(|(_, alias)| *alias);

        let raw = object
            .get(name)
            .or_else(|| alias.and_then(|a| object.get(a)))
            .ok_or_else(|| Error::Schema(format!("Missing field: '{}'", name)))?;

        match raw.as_f64() {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(Error::Schema(format!(
                "Incorrect type for '{}': expected number, found {}",
                name,
                json_type_name(raw)
            ))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_body() -> Value {
        json!({
            "uuid": 7,
            "label": "overheating",
            "mean_current": 23.0,
            "mean_voltage": 214,
            "mean_temperature": 43.0,
            "mean_external_temperature": 26.0,
            "mean_external_humidity": 64.0,
            "mean_occupancy": 7.0
        })
    }

    #[test]
    fn test_valid_session_is_accepted() {
        let session = PreparedSession::from_json(&valid_body(), true).unwrap();
        assert_eq!(session.uuid, SessionId::Number(7));
        assert_eq!(session.label, Some(LabelType::Overheating));
        assert_eq!(session.features(), [23.0, 214.0, 43.0, 26.0, 64.0, 7.0]);
    }

    #[test]
    fn test_missing_feature_is_rejected() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("mean_voltage");
        let err = PreparedSession::from_json(&body, true).unwrap_err();
        assert!(err.to_string().contains("mean_voltage"));
    }

    #[test]
    fn test_wrong_feature_type_is_rejected() {
        let mut body = valid_body();
        body["mean_occupancy"] = json!("seven");
        assert!(PreparedSession::from_json(&body, true).is_err());
    }

    #[test]
    fn test_label_required_only_in_development_context() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("label");
        assert!(PreparedSession::from_json(&body, true).is_err());
        let session = PreparedSession::from_json(&body, false).unwrap();
        assert!(session.label.is_none());
    }

    #[test]
    fn test_short_feature_aliases_and_upper_case_id() {
        let body = json!({
            "UUID": "s-1",
            "label": "none",
            "mean_current": 1.0,
            "mean_voltage": 220.0,
            "mean_temperature": 30.0,
            "mean_ex_temperature": 20.0,
            "mean_ex_humidity": 50.0,
            "mean_occupancy": 2.0
        });
        let session = PreparedSession::from_json(&body, true).unwrap();
        assert_eq!(session.uuid, SessionId::Text("s-1".to_string()));
        assert_eq!(session.mean_external_humidity, 50.0);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(PreparedSession::from_json(&json!([1, 2, 3]), false).is_err());
    }
}
