//! Fully-connected ReLU network with softmax output, trained by SGD on
//! cross-entropy. Inputs are z-score normalised with statistics taken from
//! the training rows.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{artifact_path, FeatureRow, HyperparameterConfiguration, TrainableModel};
use crate::model::{LabelType, FEATURE_COUNT};
use crate::state::{read_json, write_json_atomic};
use crate::{Error, Result};

const CLASS_COUNT: usize = LabelType::ALL.len();

/// Floor on the standard deviation so constant features do not divide by zero
const MIN_STD: f64 = 1e-8;

/// Floor on predicted probability inside the log-loss
const MIN_PROB: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DenseLayer {
    inputs: usize,
    outputs: usize,
    /// Row-major `outputs x inputs`
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl DenseLayer {
    /// Xavier/Glorot uniform initialisation
    fn init(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = (0..inputs * outputs).map(|_| rng.gen_range(-limit..limit)).collect();
        Self {
            inputs,
            outputs,
            weights,
            biases: vec![0.0; outputs],
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|j| {
                let row = &self.weights[j * self.inputs..(j + 1) * self.inputs];
                self.biases[j] + row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Standardizer {
    mean: [f64; FEATURE_COUNT],
    std: [f64; FEATURE_COUNT],
}

impl Standardizer {
    fn fit(rows: &[FeatureRow]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x / n;
            }
        }
        let mut std = [0.0; FEATURE_COUNT];
        for row in rows {
            for i in 0..FEATURE_COUNT {
                std[i] += (row[i] - mean[i]).powi(2) / n;
            }
        }
        for s in std.iter_mut() {
            *s = s.sqrt().max(MIN_STD);
        }
        Self { mean, std }
    }

    fn apply(&self, row: &FeatureRow) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

/// Multi-layer perceptron classifier over the three fault labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpClassifier {
    hyperparameters: HyperparameterConfiguration,
    learning_rate: f64,
    seed: u64,
    layers: Vec<DenseLayer>,
    standardizer: Option<Standardizer>,
    loss_history: Vec<f64>,
}

impl MlpClassifier {
    pub fn new(hyperparameters: HyperparameterConfiguration, learning_rate: f64, seed: u64) -> Self {
        Self {
            hyperparameters,
            learning_rate,
            seed,
            layers: Vec::new(),
            standardizer: None,
            loss_history: Vec::new(),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.standardizer.is_some() && !self.layers.is_empty()
    }

    /// Check that the layers chain from the feature row to the label set
    /// with weight and bias vectors of the declared sizes.
    ///
    /// Deserialized models are not trusted: a shape mismatch would
    /// otherwise surface as an out-of-bounds slice during inference.
    pub fn validate(&self) -> Result<()> {
        if self.standardizer.is_none() || self.layers.is_empty() {
            return Err(Error::Model("Classifier has not been trained".to_string()));
        }
        let mut expected_inputs = FEATURE_COUNT;
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.inputs != expected_inputs {
                return Err(Error::Model(format!(
                    "Layer {} takes {} inputs, previous layer yields {}",
                    index, layer.inputs, expected_inputs
                )));
            }
            if layer.outputs == 0 {
                return Err(Error::Model(format!("Layer {} has no outputs", index)));
            }
            if layer.weights.len() != layer.inputs * layer.outputs {
                return Err(Error::Model(format!(
                    "Layer {} has {} weights, expected {}",
                    index,
                    layer.weights.len(),
                    layer.inputs * layer.outputs
                )));
            }
            if layer.biases.len() != layer.outputs {
                return Err(Error::Model(format!(
                    "Layer {} has {} biases, expected {}",
                    index,
                    layer.biases.len(),
                    layer.outputs
                )));
            }
            expected_inputs = layer.outputs;
        }
        if expected_inputs != CLASS_COUNT {
            return Err(Error::Model(format!(
                "Output layer yields {} classes, expected {}",
                expected_inputs, CLASS_COUNT
            )));
        }
        Ok(())
    }

    fn init_layers(&self, rng: &mut StdRng) -> Vec<DenseLayer> {
        let mut sizes = vec![FEATURE_COUNT];
        sizes.extend(self.hyperparameters.hidden_layer_widths.iter().map(|w| *w as usize));
        sizes.push(CLASS_COUNT);
        sizes.windows(2).map(|pair| DenseLayer::init(pair[0], pair[1], rng)).collect()
    }

    /// Activations of every layer, input first, softmax probabilities last
    fn forward(&self, input: Vec<f64>) -> Vec<Vec<f64>> {
        let mut activations = vec![input];
        let last = self.layers.len().saturating_sub(1);
        for (index, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&activations[activations.len() - 1]);
            let a = if index == last {
                softmax(&z)
            } else {
                z.into_iter().map(|v| v.max(0.0)).collect()
            };
            activations.push(a);
        }
        activations
    }

    /// One SGD step on a single row; returns its cross-entropy loss
    fn step(&mut self, input: Vec<f64>, target: usize) -> f64 {
        let activations = self.forward(input);
        let probs = &activations[activations.len() - 1];
        let loss = -probs[target].max(MIN_PROB).ln();

        let mut delta: Vec<f64> = probs.clone();
        delta[target] -= 1.0;

        let rate = self.learning_rate;
        for index in (0..self.layers.len()).rev() {
            let layer_input = &activations[index];
            let layer = &mut self.layers[index];

            let previous_delta = (index > 0).then(|| {
                (0..layer.inputs)
                    .map(|i| {
                        if layer_input[i] <= 0.0 {
                            return 0.0;
                        }
                        (0..layer.outputs)
                            .map(|j| layer.weights[j * layer.inputs + i] * delta[j])
                            .sum::<f64>()
                    })
                    .collect::<Vec<f64>>()
            });

            for j in 0..layer.outputs {
                for i in 0..layer.inputs {
                    layer.weights[j * layer.inputs + i] -= rate * delta[j] * layer_input[i];
                }
                layer.biases[j] -= rate * delta[j];
            }

            if let Some(d) = previous_delta {
                delta = d;
            }
        }
        loss
    }

    fn check_rows(features: &[FeatureRow], labels: &[LabelType]) -> Result<()> {
        if features.is_empty() {
            return Err(Error::Model("No rows given".to_string()));
        }
        if features.len() != labels.len() {
            return Err(Error::Model(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        Ok(())
    }
}

fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if *v > best.1 { (i, *v) } else { best })
        .0
}

impl TrainableModel for MlpClassifier {
    fn configure(&mut self, hyperparameters: &HyperparameterConfiguration) {
        self.hyperparameters = hyperparameters.clone();
        self.layers.clear();
        self.standardizer = None;
        self.loss_history.clear();
    }

    fn hyperparameters(&self) -> &HyperparameterConfiguration {
        &self.hyperparameters
    }

    fn train(&mut self, features: &[FeatureRow], labels: &[LabelType]) -> Result<()> {
        Self::check_rows(features, labels)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        self.layers = self.init_layers(&mut rng);
        let standardizer = Standardizer::fit(features);
        let inputs: Vec<Vec<f64>> = features.iter().map(|row| standardizer.apply(row)).collect();
        self.standardizer = Some(standardizer);
        self.loss_history.clear();

        let mut order: Vec<usize> = (0..inputs.len()).collect();
        for _ in 0..self.hyperparameters.iteration_count {
            order.shuffle(&mut rng);
            let mut total = 0.0;
            for &row in &order {
                total += self.step(inputs[row].clone(), labels[row].index());
            }
            self.loss_history.push(total / inputs.len() as f64);
        }

        debug!(
            config = %self.hyperparameters,
            final_loss = self.loss_history.last().copied().unwrap_or_default(),
            "Training finished"
        );
        Ok(())
    }

    fn score(&self, features: &[FeatureRow], labels: &[LabelType]) -> Result<f64> {
        Self::check_rows(features, labels)?;
        let mut wrong = 0usize;
        for (row, label) in features.iter().zip(labels) {
            if self.predict(row)? != *label {
                wrong += 1;
            }
        }
        Ok(wrong as f64 / features.len() as f64)
    }

    fn predict(&self, features: &FeatureRow) -> Result<LabelType> {
        self.validate()?;
        let standardizer = self
            .standardizer
            .as_ref()
            .ok_or_else(|| Error::Model("Classifier has not been trained".to_string()))?;
        let activations = self.forward(standardizer.apply(features));
        let probs = &activations[activations.len() - 1];
        LabelType::from_index(argmax(probs))
            .ok_or_else(|| Error::Internal("Output layer wider than label set".to_string()))
    }

    fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    fn persist(&self, dir: &Path, id: &str) -> Result<PathBuf> {
        let path = artifact_path(dir, id);
        write_json_atomic(&path, self)?;
        Ok(path)
    }

    fn load(dir: &Path, id: &str) -> Result<Self> {
        let path = artifact_path(dir, id);
        if !path.exists() {
            return Err(Error::NotFound(format!("Classifier artifact {}", path.display())));
        }
        let model: Self = read_json(&path)?;
        model.validate()?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Three well separated clusters, one per label
    fn clusters(per_class: usize) -> (Vec<FeatureRow>, Vec<LabelType>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for label in LabelType::ALL {
            let base = label.index() as f64 * 10.0;
            for k in 0..per_class {
                let jitter = (k as f64 * 0.37).sin() * 0.5;
                rows.push([base + jitter, 220.0 + base, 30.0 + base, 20.0, 50.0 + jitter, 3.0]);
                labels.push(label);
            }
        }
        (rows, labels)
    }

    fn model(widths: Vec<u32>, iterations: u32) -> MlpClassifier {
        MlpClassifier::new(HyperparameterConfiguration::new(iterations, widths), 0.05, 7)
    }

    #[test]
    fn test_learns_separable_clusters() {
        let (rows, labels) = clusters(10);
        let mut mlp = model(vec![8], 100);
        mlp.train(&rows, &labels).unwrap();
        assert_eq!(mlp.loss_history().len(), 100);
        assert!(mlp.score(&rows, &labels).unwrap() <= 0.1);
        let first = mlp.loss_history()[0];
        let last = mlp.loss_history()[99];
        assert!(last < first);
    }

    #[test]
    fn test_same_seed_same_result() {
        let (rows, labels) = clusters(5);
        let mut a = model(vec![4, 4], 20);
        let mut b = model(vec![4, 4], 20);
        a.train(&rows, &labels).unwrap();
        b.train(&rows, &labels).unwrap();
        assert_eq!(a.loss_history(), b.loss_history());
    }

    #[test]
    fn test_untrained_model_cannot_predict() {
        let mlp = model(vec![4], 10);
        assert!(mlp.predict(&[0.0; FEATURE_COUNT]).is_err());
        assert!(!mlp.is_trained());
    }

    #[test]
    fn test_mismatched_rows_rejected() {
        let (rows, _) = clusters(2);
        let mut mlp = model(vec![4], 5);
        assert!(mlp.train(&rows, &[LabelType::None]).is_err());
        assert!(mlp.train(&[], &[]).is_err());
    }

    #[test]
    fn test_configure_discards_weights() {
        let (rows, labels) = clusters(3);
        let mut mlp = model(vec![4], 5);
        mlp.train(&rows, &labels).unwrap();
        mlp.configure(&HyperparameterConfiguration::new(5, vec![8, 4]));
        assert!(!mlp.is_trained());
        assert!(mlp.loss_history().is_empty());
        assert_eq!(mlp.hyperparameters().hidden_layer_widths, vec![8, 4]);
    }

    #[test]
    fn test_persist_and_load_preserve_predictions() {
        let dir = TempDir::new().unwrap();
        let (rows, labels) = clusters(5);
        let mut mlp = model(vec![8, 4], 30);
        mlp.train(&rows, &labels).unwrap();

        let path = mlp.persist(dir.path(), "NN3").unwrap();
        assert_eq!(path, dir.path().join("NN3.json"));

        let loaded = MlpClassifier::load(dir.path(), "NN3").unwrap();
        assert_eq!(loaded.hyperparameters(), mlp.hyperparameters());
        for row in &rows {
            assert_eq!(loaded.predict(row).unwrap(), mlp.predict(row).unwrap());
        }
        assert!(MlpClassifier::load(dir.path(), "NN9").is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_layers() {
        let (rows, labels) = clusters(3);
        let mut mlp = model(vec![4], 5);
        mlp.train(&rows, &labels).unwrap();
        mlp.validate().unwrap();

        let mut truncated = mlp.clone();
        truncated.layers[0].weights.clear();
        assert!(truncated.validate().is_err());
        assert!(truncated.predict(&rows[0]).is_err());

        let mut short_bias = mlp.clone();
        short_bias.layers[1].biases.pop();
        assert!(short_bias.validate().is_err());

        let mut wrong_input = mlp.clone();
        wrong_input.layers[0].inputs = FEATURE_COUNT + 1;
        assert!(wrong_input.validate().is_err());

        let mut missing_output = mlp.clone();
        missing_output.layers.pop();
        assert!(missing_output.validate().is_err());
        assert!(missing_output.predict(&rows[0]).is_err());
    }

    #[test]
    fn test_load_rejects_malformed_artifact() {
        let dir = TempDir::new().unwrap();
        let (rows, labels) = clusters(3);
        let mut mlp = model(vec![4], 5);
        mlp.train(&rows, &labels).unwrap();
        mlp.layers[0].weights.truncate(3);
        write_json_atomic(&artifact_path(dir.path(), "NN1"), &mlp).unwrap();

        assert!(matches!(MlpClassifier::load(dir.path(), "NN1"), Err(Error::Model(_))));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(argmax(&p), 2);
    }
}
