//! Trainable classifier capability
//!
//! The development system drives any [`TrainableModel`]; the classification
//! system only needs `load` and `predict`. [`MlpClassifier`] is the model
//! shipped with the pipeline.

mod mlp;

pub use mlp::MlpClassifier;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::{LabelType, FEATURE_COUNT};
use crate::Result;

/// Feature row in `FEATURE_NAMES` order
pub type FeatureRow = [f64; FEATURE_COUNT];

/// Topology and training length of a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperparameterConfiguration {
    pub iteration_count: u32,
    /// Width of each hidden layer, input side first
    pub hidden_layer_widths: Vec<u32>,
}

impl HyperparameterConfiguration {
    pub fn new(iteration_count: u32, hidden_layer_widths: Vec<u32>) -> Self {
        Self {
            iteration_count,
            hidden_layer_widths,
        }
    }

    /// True when no layer is wider than the one before it
    pub fn is_funnel(&self) -> bool {
        self.hidden_layer_widths.windows(2).all(|w| w[0] >= w[1])
    }

    pub fn layer_count(&self) -> usize {
        self.hidden_layer_widths.len()
    }
}

impl fmt::Display for HyperparameterConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths: Vec<String> = self.hidden_layer_widths.iter().map(u32::to_string).collect();
        write!(f, "({}) x {} iterations", widths.join(", "), self.iteration_count)
    }
}

/// Operations the pipeline needs from a classifier
pub trait TrainableModel: Send {
    /// Replace the topology; discards any trained weights
    fn configure(&mut self, hyperparameters: &HyperparameterConfiguration);

    fn hyperparameters(&self) -> &HyperparameterConfiguration;

    /// Fit on labeled rows, recording one loss value per iteration
    fn train(&mut self, features: &[FeatureRow], labels: &[LabelType]) -> Result<()>;

    /// Misclassification rate in `[0, 1]`
    fn score(&self, features: &[FeatureRow], labels: &[LabelType]) -> Result<f64>;

    fn predict(&self, features: &FeatureRow) -> Result<LabelType>;

    /// Loss per iteration of the last `train` call
    fn loss_history(&self) -> &[f64];

    /// Write the artifact as `<dir>/<id>.json`, returning its path
    fn persist(&self, dir: &Path, id: &str) -> Result<PathBuf>;

    fn load(dir: &Path, id: &str) -> Result<Self>
    where
        Self: Sized;
}

/// Builds fresh models for a configuration and reloads persisted ones
pub trait ModelFactory: Send + Sync {
    type Model: TrainableModel;

    fn create(&self, hyperparameters: &HyperparameterConfiguration) -> Self::Model;

    fn load(&self, dir: &Path, id: &str) -> Result<Self::Model> {
        Self::Model::load(dir, id)
    }
}

/// Factory for [`MlpClassifier`] with a fixed learning rate and seed
#[derive(Debug, Clone, Copy)]
pub struct MlpFactory {
    pub learning_rate: f64,
    pub seed: u64,
}

impl ModelFactory for MlpFactory {
    type Model = MlpClassifier;

    fn create(&self, hyperparameters: &HyperparameterConfiguration) -> MlpClassifier {
        MlpClassifier::new(hyperparameters.clone(), self.learning_rate, self.seed)
    }
}

/// Artifact path for a model id
pub fn artifact_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funnel_detection() {
        assert!(HyperparameterConfiguration::new(10, vec![8, 8, 4]).is_funnel());
        assert!(HyperparameterConfiguration::new(10, vec![4]).is_funnel());
        assert!(HyperparameterConfiguration::new(10, vec![]).is_funnel());
        assert!(!HyperparameterConfiguration::new(10, vec![4, 8]).is_funnel());
    }

    #[test]
    fn test_display() {
        let config = HyperparameterConfiguration::new(50, vec![8, 4]);
        assert_eq!(config.to_string(), "(8, 4) x 50 iterations");
    }
}
