//! Balancing and coverage reports over the buffered sessions

use fcp_common::config::FeatureRanges;
use fcp_common::model::{LabelType, PreparedSession, FEATURE_COUNT, FEATURE_NAMES};
use serde::Serialize;

/// Count and share of one label class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassShare {
    pub label: LabelType,
    pub count: usize,
    pub share: f64,
}

/// Class distribution against the uniform share
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReport {
    pub total: usize,
    pub uniform_share: f64,
    pub tolerance_interval: f64,
    pub classes: Vec<ClassShare>,
    pub balanced: bool,
}

impl BalanceReport {
    /// Every class share must lie within `uniform_share ± tolerance_interval`
    pub fn compute(sessions: &[PreparedSession], tolerance_interval: f64) -> Self {
        let mut counts = [0usize; LabelType::ALL.len()];
        for label in sessions.iter().filter_map(|s| s.label) {
            counts[label.index()] += 1;
        }
        let total: usize = counts.iter().sum();
        let uniform_share = 1.0 / LabelType::ALL.len() as f64;

        let classes: Vec<ClassShare> = LabelType::ALL
            .iter()
            .map(|label| {
                let count = counts[label.index()];
                let share = if total == 0 { 0.0 } else { count as f64 / total as f64 };
                ClassShare {
                    label: *label,
                    count,
                    share,
                }
            })
            .collect();

        let balanced = total > 0
            && classes
                .iter()
                .all(|c| (c.share - uniform_share).abs() <= tolerance_interval + f64::EPSILON);

        Self {
            total,
            uniform_share,
            tolerance_interval,
            classes,
            balanced,
        }
    }
}

/// Mean of one feature normalised into its expected range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCoverage {
    pub feature: &'static str,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub normalized_mean: f64,
}

/// Per-feature coverage of the configured value ranges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub features: Vec<FeatureCoverage>,
    pub covered: bool,
}

impl CoverageReport {
    /// Covered when every normalised mean lies in `[0, 1]`
    pub fn compute(sessions: &[PreparedSession], ranges: &FeatureRanges) -> Self {
        let n = sessions.len();
        let mut sums = [0.0; FEATURE_COUNT];
        for session in sessions {
            for (sum, value) in sums.iter_mut().zip(session.features()) {
                *sum += value;
            }
        }

        let features: Vec<FeatureCoverage> = FEATURE_NAMES
            .into_iter()
            .zip(ranges.as_array())
            .zip(sums)
            .map(|((name, [min, max]), sum)| {
                let mean = if n == 0 { 0.0 } else { sum / n as f64 };
                let span = (max - min).max(f64::EPSILON);
                FeatureCoverage {
                    feature: name,
                    mean,
                    min,
                    max,
                    normalized_mean: (mean - min) / span,
                }
            })
            .collect();

        let covered = n > 0
            && features
                .iter()
                .all(|f| (0.0..=1.0).contains(&f.normalized_mean));

        Self { features, covered }
    }
}
