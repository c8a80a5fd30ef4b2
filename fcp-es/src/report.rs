//! Evaluation report over a batch of label pairs

use serde::Serialize;

use crate::label::LabelPair;

/// Report file name under the module's reports folder
pub const EVALUATION_REPORT: &str = "evaluation_report";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub compared_pairs: u32,
    pub mismatches: u32,
    pub longest_mismatch_run: u32,
    pub max_errors: u32,
    pub max_consecutive_errors: u32,
    pub pairs: Vec<LabelPair>,
}

impl EvaluationReport {
    pub fn compute(pairs: Vec<LabelPair>, max_errors: u32, max_consecutive_errors: u32) -> Self {
        let mut mismatches = 0;
        let mut run = 0;
        let mut longest = 0;
        for pair in &pairs {
            if pair.is_mismatch() {
                mismatches += 1;
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }

        Self {
            compared_pairs: pairs.len() as u32,
            mismatches,
            longest_mismatch_run: longest,
            max_errors,
            max_consecutive_errors,
            pairs,
        }
    }

    pub fn errors_within_tolerance(&self) -> bool {
        self.mismatches <= self.max_errors
    }

    pub fn consecutive_within_tolerance(&self) -> bool {
        self.longest_mismatch_run <= self.max_consecutive_errors
    }

    /// Recommended verdict: both tolerances hold
    pub fn passed(&self) -> bool {
        self.errors_within_tolerance() && self.consecutive_within_tolerance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcp_common::model::{LabelType, SessionId};

    fn pairs(pattern: &str) -> Vec<LabelPair> {
        pattern
            .chars()
            .enumerate()
            .map(|(i, c)| LabelPair {
                uuid: SessionId::Number(i as i64),
                expert: LabelType::None,
                classifier: if c == 'x' { LabelType::Electrical } else { LabelType::None },
            })
            .collect()
    }

    #[test]
    fn test_counts_and_longest_run() {
        let report = EvaluationReport::compute(pairs("x.xx.xxx."), 10, 10);
        assert_eq!(report.compared_pairs, 9);
        assert_eq!(report.mismatches, 6);
        assert_eq!(report.longest_mismatch_run, 3);
        assert!(report.passed());
    }

    #[test]
    fn test_total_error_tolerance() {
        let report = EvaluationReport::compute(pairs("x.x.x."), 2, 5);
        assert!(!report.errors_within_tolerance());
        assert!(report.consecutive_within_tolerance());
        assert!(!report.passed());
    }

    #[test]
    fn test_consecutive_error_tolerance() {
        let report = EvaluationReport::compute(pairs("..xxx."), 5, 2);
        assert!(report.errors_within_tolerance());
        assert!(!report.passed());
    }

    #[test]
    fn test_clean_batch() {
        let report = EvaluationReport::compute(pairs("...."), 0, 0);
        assert_eq!(report.mismatches, 0);
        assert_eq!(report.longest_mismatch_run, 0);
        assert!(report.passed());
    }
}
