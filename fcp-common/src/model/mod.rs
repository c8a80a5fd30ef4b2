//! Shared data model exchanged between the pipeline services

mod label;
mod learning_set;
mod prepared_session;

pub use label::{LabelMessage, LabelType, SessionId};
pub use learning_set::{LearningSet, LearningSetEntry, SplitKind};
pub use prepared_session::{PreparedSession, FEATURE_COUNT, FEATURE_NAMES};
