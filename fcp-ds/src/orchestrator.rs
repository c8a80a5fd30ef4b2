//! Development control loop
//!
//! One persisted [`Stage`] drives the sequence from receiving a learning set
//! to deploying the winner classifier. Every transition is written to disk
//! before the next stage starts, so a restarted process resumes at the last
//! completed stage.

use fcp_common::classifier::{HyperparameterConfiguration, ModelFactory, TrainableModel};
use fcp_common::config::{DevelopmentSettings, PeerAddress};
use fcp_common::decision::{ChoiceQuestion, CountQuestion, DecisionProvider, GateQuestion};
use fcp_common::model::{LearningSet, SplitKind};
use fcp_common::report::write_report;
use fcp_common::state::{read_json, write_json_atomic, StateFile};
use fcp_common::transport::{Inbox, Transport};
use fcp_common::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::hyperparams::{average_configuration, search_space};
use crate::reports::{LearningReport, TestReport, ValidationReport};
use crate::search::{load_winner, select_winner, CandidateSearch, SearchPaths};

/// Route on the classification system accepting a classifier artifact
pub const DEPLOY_ROUTE: &str = "/deploy";

/// Exit status after the test gate rejects the winner
pub const EXIT_CONFIG_SENT: i32 = 2;

/// Exit status after the winner could not be delivered
pub const EXIT_DEPLOY_FAILED: i32 = 3;

/// Artifact id of the model trained with the average configuration
const LEARNING_MODEL_ID: &str = "learning_classifier";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Waiting,
    SetAvgHyp,
    SetNumIters,
    Train,
    GenLearnReport,
    SetHyp,
    GenTestReport,
    ConfigSent,
    SendClassifier,
}

/// What the caller of [`DevelopmentOrchestrator::step`] should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(i32),
}

/// Working values that must survive a restart alongside the stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Progress {
    configuration: Option<HyperparameterConfiguration>,
}

/// Files owned by the development system
#[derive(Debug, Clone)]
pub struct DevelopmentPaths {
    pub module_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub search: SearchPaths,
}

impl DevelopmentPaths {
    pub fn new(module_dir: &Path, reports_dir: &Path) -> Self {
        Self {
            module_dir: module_dir.to_path_buf(),
            reports_dir: reports_dir.to_path_buf(),
            search: SearchPaths::under(module_dir),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.module_dir.join("state.json")
    }

    pub fn learning_set_path(&self) -> PathBuf {
        self.module_dir.join("learning_set.json")
    }

    fn progress_path(&self) -> PathBuf {
        self.module_dir.join("progress.json")
    }
}

pub struct DevelopmentOrchestrator<T, D, F> {
    settings: DevelopmentSettings,
    paths: DevelopmentPaths,
    classification: PeerAddress,
    state: StateFile<Stage>,
    stage: Stage,
    progress: Progress,
    learning_set: Option<LearningSet>,
    inbox: Inbox<LearningSet>,
    transport: T,
    decisions: D,
    factory: F,
}

impl<T, D, F> DevelopmentOrchestrator<T, D, F>
where
    T: Transport,
    D: DecisionProvider,
    F: ModelFactory,
{
    pub fn new(
        settings: DevelopmentSettings,
        paths: DevelopmentPaths,
        classification: PeerAddress,
        inbox: Inbox<LearningSet>,
        transport: T,
        decisions: D,
        factory: F,
    ) -> Result<Self> {
        std::fs::create_dir_all(&paths.module_dir)?;
        std::fs::create_dir_all(&paths.reports_dir)?;

        let state = StateFile::new(paths.state_path());
        let stage = state.load_or(Stage::Waiting);
        let progress = if paths.progress_path().exists() {
            read_json(&paths.progress_path())?
        } else {
            Progress::default()
        };
        info!(?stage, "Development stage restored");

        Ok(Self {
            settings,
            paths,
            classification,
            state,
            stage,
            progress,
            learning_set: None,
            inbox,
            transport,
            decisions,
            factory,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Configuration the next training run will use
    pub fn configuration(&self) -> Option<&HyperparameterConfiguration> {
        self.progress.configuration.as_ref()
    }

    fn transition(&mut self, next: Stage) -> Result<()> {
        info!(from = ?self.stage, to = ?next, "Development transition");
        self.stage = next;
        self.state.save(&next)
    }

    fn save_configuration(&mut self, configuration: HyperparameterConfiguration) -> Result<()> {
        self.progress.configuration = Some(configuration);
        write_json_atomic(&self.paths.progress_path(), &self.progress)
    }

    fn current_configuration(&self) -> HyperparameterConfiguration {
        self.progress.configuration.clone().unwrap_or_else(|| self.average_configuration())
    }

    fn average_configuration(&self) -> HyperparameterConfiguration {
        average_configuration(
            self.settings.iteration_count,
            self.settings.layer_count_range,
            self.settings.neuron_count_range,
        )
    }

    /// Stored learning set, read back from disk after a restart
    fn learning_set(&mut self) -> Result<&LearningSet> {
        let set = match self.learning_set.take() {
            Some(set) => set,
            None => read_json(&self.paths.learning_set_path())?,
        };
        Ok(self.learning_set.insert(set))
    }

    /// Perform the work of the current stage once
    pub async fn step(&mut self) -> Result<Flow> {
        match self.stage {
            Stage::Waiting => self.waiting().await,
            Stage::SetAvgHyp => self.set_avg_hyp(),
            Stage::SetNumIters => self.set_num_iters().await,
            Stage::Train => self.train(),
            Stage::GenLearnReport => self.gen_learn_report().await,
            Stage::SetHyp => self.set_hyp().await,
            Stage::GenTestReport => self.gen_test_report().await,
            Stage::ConfigSent => self.config_sent(),
            Stage::SendClassifier => self.send_classifier().await,
        }
    }

    async fn waiting(&mut self) -> Result<Flow> {
        let Some(set) = self.inbox.recv().await else {
            info!("Inbox closed while waiting for a learning set");
            return Ok(Flow::Exit(0));
        };
        info!(
            training = set.training.len(),
            validation = set.validation.len(),
            test = set.test.len(),
            "Learning set received"
        );
        write_json_atomic(&self.paths.learning_set_path(), &set)?;
        self.learning_set = Some(set);
        self.transition(Stage::SetAvgHyp)?;
        Ok(Flow::Continue)
    }

    fn set_avg_hyp(&mut self) -> Result<Flow> {
        let configuration = self.average_configuration();
        info!(%configuration, "Average hyperparameters set");
        self.save_configuration(configuration)?;
        self.transition(Stage::SetNumIters)?;
        Ok(Flow::Continue)
    }

    async fn set_num_iters(&mut self) -> Result<Flow> {
        let mut configuration = self.current_configuration();
        let question = CountQuestion::new("Number of training iterations?", configuration.iteration_count);
        configuration.iteration_count = self.decisions.resolve_count(&question).await;
        info!(iterations = configuration.iteration_count, "Iteration count set");
        self.save_configuration(configuration)?;
        self.transition(Stage::Train)?;
        Ok(Flow::Continue)
    }

    fn train(&mut self) -> Result<Flow> {
        let configuration = self.current_configuration();
        let mut model = self.factory.create(&configuration);
        let set = self.learning_set()?;
        model.train(&set.features(SplitKind::Training), &set.labels(SplitKind::Training))?;
        model.persist(&self.paths.module_dir, LEARNING_MODEL_ID)?;
        self.transition(Stage::GenLearnReport)?;
        Ok(Flow::Continue)
    }

    async fn gen_learn_report(&mut self) -> Result<Flow> {
        let model = self.factory.load(&self.paths.module_dir, LEARNING_MODEL_ID)?;
        let report = LearningReport::new(model.hyperparameters().clone(), model.loss_history().to_vec());
        write_report(&self.paths.reports_dir, "learning_report", &report)?;

        let question = GateQuestion::new("Is the number of iterations acceptable?", report.converging);
        if self.decisions.resolve_gate(&question).await {
            self.transition(Stage::SetHyp)?;
        } else {
            // Next suggestion trains twice as long
            let mut configuration = self.current_configuration();
            configuration.iteration_count = configuration.iteration_count.saturating_mul(2);
            self.save_configuration(configuration)?;
            self.transition(Stage::SetNumIters)?;
        }
        Ok(Flow::Continue)
    }

    async fn set_hyp(&mut self) -> Result<Flow> {
        let iteration_count = self.current_configuration().iteration_count;
        let space = search_space(
            iteration_count,
            self.settings.layer_count_range,
            self.settings.neuron_count_range,
        )?;

        let set = self.learning_set()?.clone();
        let search = CandidateSearch::new(&self.factory, &self.paths.search, self.settings.overfitting_tolerance);
        let ledger = search.run(&set, &space)?;

        let report = ValidationReport {
            overfitting_tolerance: self.settings.overfitting_tolerance,
            configurations_tried: space.len(),
            candidates: ledger.entries().to_vec(),
        };
        write_report(&self.paths.reports_dir, "validation_report", &report)?;

        let options: Vec<String> = ledger.entries().iter().map(|c| c.id.clone()).collect();
        let question = ChoiceQuestion::new("Winner classifier id?", options.clone(), options.first().cloned());
        loop {
            let Some(id) = self.decisions.resolve_choice(&question).await else {
                info!("No winner chosen, restarting the configuration search");
                self.transition(Stage::SetAvgHyp)?;
                return Ok(Flow::Continue);
            };
            if select_winner(&self.paths.search, &id)?.is_some() {
                self.transition(Stage::GenTestReport)?;
                return Ok(Flow::Continue);
            }
        }
    }

    async fn gen_test_report(&mut self) -> Result<Flow> {
        let winner = load_winner(&self.paths.search)?;
        let model = self.factory.load(&self.paths.search.candidates_dir, &winner.id)?;
        let set = self.learning_set()?;
        let validation_error = model.score(&set.features(SplitKind::Validation), &set.labels(SplitKind::Validation))?;
        let test_error = model.score(&set.features(SplitKind::Test), &set.labels(SplitKind::Test))?;

        let report = TestReport::new(
            winner.id.clone(),
            validation_error,
            test_error,
            self.settings.generalization_tolerance,
        );
        write_report(&self.paths.reports_dir, "test_report", &report)?;

        let question = GateQuestion::new("Does the winner classifier generalize?", report.within_tolerance);
        if self.decisions.resolve_gate(&question).await {
            self.transition(Stage::SendClassifier)?;
        } else {
            self.transition(Stage::ConfigSent)?;
        }
        Ok(Flow::Continue)
    }

    fn config_sent(&mut self) -> Result<Flow> {
        error!("Winner classifier rejected by the test gate, reconfiguration required");
        self.transition(Stage::Waiting)?;
        Ok(Flow::Exit(EXIT_CONFIG_SENT))
    }

    async fn send_classifier(&mut self) -> Result<Flow> {
        let winner = load_winner(&self.paths.search)?;
        let artifact = self.paths.search.artifact(&winner.id);
        if !self.transport.send_file(&self.classification, DEPLOY_ROUTE, &artifact).await {
            error!(id = %winner.id, peer = %self.classification, "Winner classifier delivery failed");
            return Ok(Flow::Exit(EXIT_DEPLOY_FAILED));
        }
        info!(id = %winner.id, "Winner classifier deployed");
        self.transition(Stage::Waiting)?;
        Ok(Flow::Continue)
    }

    /// Drive the loop until a stage asks for termination; returns the exit code
    pub async fn run(mut self) -> Result<i32> {
        loop {
            match self.step().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(code)) => return Ok(code),
                Err(e) => {
                    warn!(stage = ?self.stage, error = %e, "Development step failed");
                    return Err(e);
                }
            }
        }
    }
}
