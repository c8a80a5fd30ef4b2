//! Segregation control loop
//!
//! `STORE -> BALANCING -> COVERAGE -> LEARNING -> STORE`. The stage is
//! rewritten to disk after every transition; the session counter is derived
//! from the buffer on restart. A batch that cannot become a complete learning
//! set is discarded rather than offered to the development system.

use fcp_common::config::{PeerAddress, SegregationSettings};
use fcp_common::decision::{DecisionProvider, GateQuestion};
use fcp_common::model::PreparedSession;
use fcp_common::report::write_report;
use fcp_common::state::StateFile;
use fcp_common::time::millis_to_duration;
use fcp_common::transport::{Inbox, Transport};
use fcp_common::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::reports::{BalanceReport, CoverageReport};
use crate::splitter::split_learning_set;
use crate::store::SessionStore;

/// Route on the development system receiving learning sets
pub const LEARNING_SETS_ROUTE: &str = "/learning_sets";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegregationStage {
    Store,
    Balancing,
    Coverage,
    Learning,
}

/// Outcome of a single [`SegregationMachine::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// LEARNING delivery failed; the buffer is kept for the next attempt
    DeliveryFailed,
    /// Inbox closed while waiting in STORE
    InboxClosed,
}

/// Filesystem and peer wiring for a machine
pub struct MachineContext {
    pub state_path: PathBuf,
    pub reports_dir: PathBuf,
    pub development: PeerAddress,
}

pub struct SegregationMachine<T, D> {
    settings: SegregationSettings,
    context: MachineContext,
    store: SessionStore,
    state: StateFile<SegregationStage>,
    stage: SegregationStage,
    counter: u32,
    inbox: Inbox<PreparedSession>,
    transport: T,
    decisions: D,
}

impl<T, D> SegregationMachine<T, D>
where
    T: Transport,
    D: DecisionProvider,
{
    /// Resume from the persisted stage and the buffered sessions
    pub async fn new(
        settings: SegregationSettings,
        context: MachineContext,
        store: SessionStore,
        inbox: Inbox<PreparedSession>,
        transport: T,
        decisions: D,
    ) -> Result<Self> {
        let state = StateFile::new(context.state_path.clone());
        let stage = state.load_or(SegregationStage::Store);
        let counter = match stage {
            SegregationStage::Store => store.count().await?,
            _ => 0,
        };
        info!(?stage, counter, "Segregation state restored");

        let mut machine = Self {
            settings,
            context,
            store,
            state,
            stage,
            counter,
            inbox,
            transport,
            decisions,
        };
        // The quota may have been met just before the previous process stopped
        if machine.stage == SegregationStage::Store && machine.counter >= machine.settings.session_quota {
            machine.counter = 0;
            machine.transition(SegregationStage::Balancing)?;
        }
        Ok(machine)
    }

    pub fn stage(&self) -> SegregationStage {
        self.stage
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    fn transition(&mut self, next: SegregationStage) -> Result<()> {
        info!(from = ?self.stage, to = ?next, "Segregation transition");
        self.stage = next;
        self.state.save(&next)
    }

    async fn discard_buffer(&mut self) -> Result<()> {
        self.store.clear().await?;
        self.counter = 0;
        self.transition(SegregationStage::Store)
    }

    /// Buffered sessions, or None after sending an empty buffer back to STORE
    async fn buffered_sessions(&mut self) -> Result<Option<Vec<PreparedSession>>> {
        let sessions = self.store.all().await?;
        if sessions.is_empty() {
            warn!(stage = ?self.stage, "Buffer is empty, returning to store");
            self.discard_buffer().await?;
            return Ok(None);
        }
        Ok(Some(sessions))
    }

    /// Perform the work of the current stage once
    pub async fn step(&mut self) -> Result<StepOutcome> {
        match self.stage {
            SegregationStage::Store => self.store_step().await,
            SegregationStage::Balancing => self.balancing_step().await,
            SegregationStage::Coverage => self.coverage_step().await,
            SegregationStage::Learning => self.learning_step().await,
        }
    }

    async fn store_step(&mut self) -> Result<StepOutcome> {
        let Some(session) = self.inbox.recv().await else {
            return Ok(StepOutcome::InboxClosed);
        };

        if let Err(e) = self.store.insert(&session).await {
            error!(uuid = %session.uuid, error = %e, "Failed to store prepared session");
            return Ok(StepOutcome::Continue);
        }
        self.counter += 1;
        info!(uuid = %session.uuid, counter = self.counter, quota = self.settings.session_quota, "Prepared session stored");

        if self.counter >= self.settings.session_quota {
            self.counter = 0;
            self.transition(SegregationStage::Balancing)?;
        }
        Ok(StepOutcome::Continue)
    }

    async fn balancing_step(&mut self) -> Result<StepOutcome> {
        let Some(sessions) = self.buffered_sessions().await? else {
            return Ok(StepOutcome::Continue);
        };
        let report = BalanceReport::compute(&sessions, self.settings.tolerance_interval);
        write_report(&self.context.reports_dir, "balancing_report", &report)?;

        let question = GateQuestion::new("Is the dataset balanced?", report.balanced);
        if self.decisions.resolve_gate(&question).await {
            self.transition(SegregationStage::Coverage)?;
        } else {
            warn!(total = report.total, "Dataset rejected as unbalanced, discarding buffer");
            self.discard_buffer().await?;
        }
        Ok(StepOutcome::Continue)
    }

    async fn coverage_step(&mut self) -> Result<StepOutcome> {
        let Some(sessions) = self.buffered_sessions().await? else {
            return Ok(StepOutcome::Continue);
        };
        let report = CoverageReport::compute(&sessions, &self.settings.feature_ranges);
        write_report(&self.context.reports_dir, "coverage_report", &report)?;

        let question = GateQuestion::new("Does the dataset cover the feature ranges?", report.covered);
        if self.decisions.resolve_gate(&question).await {
            self.transition(SegregationStage::Learning)?;
        } else {
            warn!("Dataset rejected for coverage, discarding buffer");
            self.discard_buffer().await?;
        }
        Ok(StepOutcome::Continue)
    }

    async fn learning_step(&mut self) -> Result<StepOutcome> {
        let Some(sessions) = self.buffered_sessions().await? else {
            return Ok(StepOutcome::Continue);
        };
        let learning_set = split_learning_set(
            &sessions,
            self.settings.validation_fraction,
            self.settings.test_fraction,
        );
        info!(
            training = learning_set.training.len(),
            validation = learning_set.validation.len(),
            test = learning_set.test.len(),
            "Learning set prepared"
        );
        if !learning_set.is_complete() {
            warn!(
                buffered = sessions.len(),
                "Batch cannot fill training, validation and test, discarding buffer"
            );
            self.discard_buffer().await?;
            return Ok(StepOutcome::Continue);
        }

        let payload = serde_json::to_value(&learning_set)?;
        if !self
            .transport
            .send(&self.context.development, LEARNING_SETS_ROUTE, &payload)
            .await
        {
            warn!(peer = %self.context.development, "Learning set not delivered, keeping buffer");
            return Ok(StepOutcome::DeliveryFailed);
        }

        self.discard_buffer().await?;
        Ok(StepOutcome::Continue)
    }

    /// Drive the machine until the inbox closes
    ///
    /// Failed deliveries and stage errors are retried after `retry_delay_ms`.
    pub async fn run(mut self) -> Result<()> {
        let retry_delay = millis_to_duration(self.settings.retry_delay_ms);
        loop {
            match self.step().await {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::DeliveryFailed) => tokio::time::sleep(retry_delay).await,
                Ok(StepOutcome::InboxClosed) => {
                    info!("Inbox closed, segregation loop stopping");
                    return Ok(());
                }
                Err(e) => {
                    error!(stage = ?self.stage, error = %e, "Segregation step failed");
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
}
