//! Candidate search, ranking and winner archival

use fcp_common::classifier::{artifact_path, HyperparameterConfiguration, ModelFactory, TrainableModel};
use fcp_common::model::{LearningSet, SplitKind};
use fcp_common::state::{read_json, write_json_atomic};
use fcp_common::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Maximum number of ranked candidates kept
pub const LEDGER_CAPACITY: usize = 5;

/// One trained configuration that passed the overfitting filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateClassifier {
    pub id: String,
    pub hyperparameters: HyperparameterConfiguration,
    pub train_error: f64,
    pub validation_error: f64,
    pub error_gap: f64,
}

impl CandidateClassifier {
    pub fn new(id: String, hyperparameters: HyperparameterConfiguration, train_error: f64, validation_error: f64) -> Self {
        Self {
            id,
            hyperparameters,
            train_error,
            validation_error,
            error_gap: (validation_error - train_error).abs(),
        }
    }
}

/// Top candidates ordered ascending by validation error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateLedger {
    entries: Vec<CandidateClassifier>,
}

impl CandidateLedger {
    pub fn entries(&self) -> &[CandidateClassifier] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CandidateClassifier> {
        self.entries.iter().find(|c| c.id == id)
    }

    /// Insert, re-rank and truncate; returns the entries that fell off
    ///
    /// Ties keep insertion order, so an equal newcomer ranks behind.
    pub fn insert(&mut self, candidate: CandidateClassifier) -> Vec<CandidateClassifier> {
        self.entries.push(candidate);
        self.entries
            .sort_by(|a, b| a.validation_error.total_cmp(&b.validation_error));
        if self.entries.len() > LEDGER_CAPACITY {
            self.entries.split_off(LEDGER_CAPACITY)
        } else {
            Vec::new()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// File locations used by the search
#[derive(Debug, Clone)]
pub struct SearchPaths {
    /// Holds nothing but candidate artifacts
    pub candidates_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub winner_path: PathBuf,
}

impl SearchPaths {
    /// Standard layout below a module folder
    pub fn under(module_dir: &Path) -> Self {
        Self {
            candidates_dir: module_dir.join("candidates"),
            ledger_path: module_dir.join("candidate_ledger.json"),
            winner_path: module_dir.join("winner_classifier.json"),
        }
    }

    pub fn artifact(&self, id: &str) -> PathBuf {
        artifact_path(&self.candidates_dir, id)
    }
}

/// Grid search over a prepared space of configurations
pub struct CandidateSearch<'a, F> {
    factory: &'a F,
    paths: &'a SearchPaths,
    overfitting_tolerance: f64,
}

impl<'a, F: ModelFactory> CandidateSearch<'a, F> {
    pub fn new(factory: &'a F, paths: &'a SearchPaths, overfitting_tolerance: f64) -> Self {
        Self {
            factory,
            paths,
            overfitting_tolerance,
        }
    }

    /// Train every configuration and keep the best five
    ///
    /// Candidate `i` of `space` gets id `NN<i>`. The ledger is rewritten after
    /// every re-rank and evicted artifacts are deleted straight away.
    pub fn run(&self, learning_set: &LearningSet, space: &[HyperparameterConfiguration]) -> Result<CandidateLedger> {
        reset_dir(&self.paths.candidates_dir)?;

        let train_x = learning_set.features(SplitKind::Training);
        let train_y = learning_set.labels(SplitKind::Training);
        let val_x = learning_set.features(SplitKind::Validation);
        let val_y = learning_set.labels(SplitKind::Validation);

        let mut ledger = CandidateLedger::default();
        ledger.save(&self.paths.ledger_path)?;

        for (index, config) in space.iter().enumerate() {
            let id = format!("NN{}", index);
            let mut model = self.factory.create(config);
            model.train(&train_x, &train_y)?;
            let train_error = model.score(&train_x, &train_y)?;
            let validation_error = model.score(&val_x, &val_y)?;

            let gap = (validation_error - train_error).abs();
            if gap > self.overfitting_tolerance {
                debug!(%id, %config, train_error, validation_error, "Candidate discarded as overfit");
                continue;
            }

            model.persist(&self.paths.candidates_dir, &id)?;
            let evicted = ledger.insert(CandidateClassifier::new(id.clone(), config.clone(), train_error, validation_error));
            for dropped in &evicted {
                remove_if_exists(&self.paths.artifact(&dropped.id))?;
            }
            ledger.save(&self.paths.ledger_path)?;
            info!(%id, %config, train_error, validation_error, ranked = ledger.len(), "Candidate trained");
        }

        info!(tried = space.len(), kept = ledger.len(), "Candidate search finished");
        Ok(ledger)
    }
}

/// Promote `id` to winner and delete every other candidate artifact
///
/// Returns None, touching nothing, when the id is not in the ledger.
pub fn select_winner(paths: &SearchPaths, id: &str) -> Result<Option<CandidateClassifier>> {
    let ledger = CandidateLedger::load(&paths.ledger_path)?;
    let Some(winner) = ledger.get(id).cloned() else {
        warn!(%id, "Winner id not found in candidate ledger");
        return Ok(None);
    };

    write_json_atomic(&paths.winner_path, &winner)?;

    let keep = paths.artifact(id);
    for entry in std::fs::read_dir(&paths.candidates_dir)? {
        let path = entry?.path();
        if path != keep && path.is_file() {
            std::fs::remove_file(&path)?;
        }
    }
    info!(%id, validation_error = winner.validation_error, "Winner classifier selected");
    Ok(Some(winner))
}

/// Winner metadata written by [`select_winner`]
pub fn load_winner(paths: &SearchPaths) -> Result<CandidateClassifier> {
    read_json(&paths.winner_path)
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcp_common::classifier::MlpFactory;
    use fcp_common::model::{LabelType, LearningSetEntry};
    use tempfile::TempDir;

    fn candidate(id: &str, validation_error: f64) -> CandidateClassifier {
        CandidateClassifier::new(
            id.to_string(),
            HyperparameterConfiguration::new(10, vec![4]),
            validation_error,
            validation_error,
        )
    }

    #[test]
    fn test_ledger_stays_sorted_and_capped() {
        let mut ledger = CandidateLedger::default();
        let errors = [0.4, 0.1, 0.3, 0.9, 0.2, 0.05, 0.6, 0.15];
        for (i, e) in errors.iter().enumerate() {
            ledger.insert(candidate(&format!("NN{}", i), *e));
            assert!(ledger.len() <= LEDGER_CAPACITY);
            assert!(ledger
                .entries()
                .windows(2)
                .all(|w| w[0].validation_error <= w[1].validation_error));
        }
        let ids: Vec<&str> = ledger.entries().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["NN5", "NN1", "NN7", "NN4", "NN2"]);
    }

    #[test]
    fn test_newcomer_worse_than_full_ledger_is_evicted() {
        let mut ledger = CandidateLedger::default();
        for i in 0..5 {
            ledger.insert(candidate(&format!("NN{}", i), 0.1));
        }
        let evicted = ledger.insert(candidate("NN5", 0.5));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, "NN5");
        assert!(ledger.get("NN5").is_none());
    }

    fn toy_set() -> LearningSet {
        let entry = |label: LabelType, k: f64| LearningSetEntry {
            features: [label.index() as f64 * 10.0 + k, 220.0, 40.0, 20.0, 50.0, 2.0],
            label,
        };
        let mut set = LearningSet::default();
        for label in LabelType::ALL {
            for k in 0..6 {
                set.training.push(entry(label, k as f64 * 0.1));
            }
            set.validation.push(entry(label, 0.25));
            set.test.push(entry(label, 0.35));
        }
        set
    }

    #[test]
    fn test_overfit_candidates_never_enter_ledger() {
        let dir = TempDir::new().unwrap();
        let paths = SearchPaths::under(dir.path());
        let factory = MlpFactory { learning_rate: 0.05, seed: 3 };
        let space = crate::hyperparams::search_space(20, [1, 2], [4, 8]).unwrap();

        // Zero tolerance only admits candidates with identical errors
        let ledger = CandidateSearch::new(&factory, &paths, 0.0).run(&toy_set(), &space).unwrap();
        assert!(ledger.entries().iter().all(|c| c.error_gap == 0.0));

        let persisted = CandidateLedger::load(&paths.ledger_path).unwrap();
        assert_eq!(persisted, ledger);
    }

    #[test]
    fn test_winner_archival_keeps_only_winner_artifact() {
        let dir = TempDir::new().unwrap();
        let paths = SearchPaths::under(dir.path());
        let factory = MlpFactory { learning_rate: 0.05, seed: 3 };
        let space = crate::hyperparams::search_space(30, [1, 2], [4, 8]).unwrap();

        let ledger = CandidateSearch::new(&factory, &paths, 1.0).run(&toy_set(), &space).unwrap();
        assert_eq!(ledger.len(), 5);
        assert_eq!(std::fs::read_dir(&paths.candidates_dir).unwrap().count(), 5);

        // Unknown id leaves the directory untouched
        assert!(select_winner(&paths, "NN42").unwrap().is_none());
        assert_eq!(std::fs::read_dir(&paths.candidates_dir).unwrap().count(), 5);
        assert!(!paths.winner_path.exists());

        let chosen = ledger.entries()[1].id.clone();
        let winner = select_winner(&paths, &chosen).unwrap().unwrap();
        assert_eq!(winner.id, chosen);

        let remaining: Vec<PathBuf> = std::fs::read_dir(&paths.candidates_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(remaining, vec![paths.artifact(&chosen)]);
        assert_eq!(load_winner(&paths).unwrap(), winner);
    }

    #[test]
    fn test_evicted_artifacts_are_deleted() {
        let dir = TempDir::new().unwrap();
        let paths = SearchPaths::under(dir.path());
        let factory = MlpFactory { learning_rate: 0.05, seed: 3 };
        // 1..=3 layers over {8, 4}: 2 + 3 + 4 = 9 configurations
        let space = crate::hyperparams::search_space(10, [1, 3], [4, 8]).unwrap();
        assert_eq!(space.len(), 9);

        let ledger = CandidateSearch::new(&factory, &paths, 1.0).run(&toy_set(), &space).unwrap();
        let mut on_disk: Vec<String> = std::fs::read_dir(&paths.candidates_dir)
            .unwrap()
            .map(|e| e.unwrap().path().file_stem().unwrap().to_string_lossy().into_owned())
            .collect();
        on_disk.sort();
        let mut ranked: Vec<String> = ledger.entries().iter().map(|c| c.id.clone()).collect();
        ranked.sort();
        assert_eq!(on_disk, ranked);
    }
}
