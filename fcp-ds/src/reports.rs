//! Learning, validation and test reports

use fcp_common::classifier::HyperparameterConfiguration;
use serde::Serialize;

use crate::search::CandidateClassifier;

/// Loss curve of the last training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningReport {
    pub hyperparameters: HyperparameterConfiguration,
    pub loss_history: Vec<f64>,
    pub final_loss: Option<f64>,
    /// True when every loss value is finite and the curve ends below its start
    pub converging: bool,
}

impl LearningReport {
    pub fn new(hyperparameters: HyperparameterConfiguration, loss_history: Vec<f64>) -> Self {
        let finite = !loss_history.is_empty() && loss_history.iter().all(|l| l.is_finite());
        let converging = finite
            && match (loss_history.first(), loss_history.last()) {
                (Some(first), Some(last)) => last <= first,
                _ => false,
            };
        Self {
            hyperparameters,
            final_loss: loss_history.last().copied(),
            loss_history,
            converging,
        }
    }
}

/// Ranked candidates after the search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub overfitting_tolerance: f64,
    pub configurations_tried: usize,
    pub candidates: Vec<CandidateClassifier>,
}

/// Generalization check of the winner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub uuid: String,
    pub validation_error: f64,
    pub test_error: f64,
    pub difference: f64,
    pub generalization_tolerance: f64,
    pub within_tolerance: bool,
}

impl TestReport {
    pub fn new(uuid: String, validation_error: f64, test_error: f64, generalization_tolerance: f64) -> Self {
        let difference = (test_error - validation_error).abs();
        Self {
            uuid,
            validation_error,
            test_error,
            difference,
            generalization_tolerance,
            within_tolerance: difference <= generalization_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learning_report_convergence() {
        let config = HyperparameterConfiguration::new(3, vec![4]);
        assert!(LearningReport::new(config.clone(), vec![1.0, 0.6, 0.4]).converging);
        assert!(!LearningReport::new(config.clone(), vec![0.4, 0.6, 1.0]).converging);
        assert!(!LearningReport::new(config.clone(), vec![f64::NAN]).converging);
        let empty = LearningReport::new(config, vec![]);
        assert!(!empty.converging);
        assert_eq!(empty.final_loss, None);
    }

    #[test]
    fn test_test_report_gap() {
        let report = TestReport::new("NN2".to_string(), 0.10, 0.25, 0.2);
        assert!((report.difference - 0.15).abs() < 1e-12);
        assert!(report.within_tolerance);
        assert!(!TestReport::new("NN2".to_string(), 0.0, 0.5, 0.2).within_tolerance);
    }
}
