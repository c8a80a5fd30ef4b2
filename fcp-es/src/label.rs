//! Labels as they arrive at the evaluation system

use fcp_common::model::{LabelMessage, LabelType, SessionId};
use fcp_common::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who produced a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelSource {
    Classifier,
    Expert,
}

impl LabelSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelSource::Classifier => "classifier",
            LabelSource::Expert => "expert",
        }
    }
}

impl fmt::Display for LabelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LabelSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classifier" => Ok(LabelSource::Classifier),
            "expert" => Ok(LabelSource::Expert),
            other => Err(Error::Schema(format!("Unknown label source '{}'", other))),
        }
    }
}

/// Inbound label tagged with the route it came in on
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedLabel {
    pub source: LabelSource,
    pub message: LabelMessage,
}

/// Expert and classifier verdicts for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPair {
    pub uuid: SessionId,
    pub expert: LabelType,
    pub classifier: LabelType,
}

impl LabelPair {
    pub fn is_mismatch(&self) -> bool {
        self.expert != self.classifier
    }
}
