//! Evaluation control loop
//!
//! Stores every inbound label and, once enough complete pairs exist,
//! reports on the classifier's agreement with the expert and asks whether
//! the classifier is still fit for production.

use fcp_common::config::EvaluationSettings;
use fcp_common::decision::{DecisionProvider, GateQuestion};
use fcp_common::report::write_report;
use fcp_common::transport::Inbox;
use fcp_common::Result;
use std::path::PathBuf;
use tracing::{error, info};

use crate::label::SourcedLabel;
use crate::report::{EvaluationReport, EVALUATION_REPORT};
use crate::store::LabelStore;

/// Result of one evaluation round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    ReconfigurationRequired,
}

/// What one loop iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Stored,
    Evaluated(Verdict),
    InboxClosed,
}

pub struct Evaluator<D> {
    settings: EvaluationSettings,
    reports_dir: PathBuf,
    store: LabelStore,
    inbox: Inbox<SourcedLabel>,
    decisions: D,
}

impl<D: DecisionProvider> Evaluator<D> {
    pub fn new(
        settings: EvaluationSettings,
        reports_dir: PathBuf,
        store: LabelStore,
        inbox: Inbox<SourcedLabel>,
        decisions: D,
    ) -> Self {
        Self {
            settings,
            reports_dir,
            store,
            inbox,
            decisions,
        }
    }

    pub fn store(&self) -> &LabelStore {
        &self.store
    }

    /// Handle one inbound label
    pub async fn step(&mut self) -> Result<StepOutcome> {
        let Some(label) = self.inbox.recv().await else {
            return Ok(StepOutcome::InboxClosed);
        };
        info!(
            uuid = %label.message.uuid,
            source = %label.source,
            label = %label.message.label,
            "Label received"
        );
        self.store.store(label.source, &label.message).await?;

        if self.store.complete_pairs().await? < self.settings.min_label_pairs {
            return Ok(StepOutcome::Stored);
        }
        self.evaluate().await.map(StepOutcome::Evaluated)
    }

    async fn evaluate(&mut self) -> Result<Verdict> {
        let pairs = self.store.pairs(self.settings.min_label_pairs).await?;
        let report = EvaluationReport::compute(
            pairs,
            self.settings.max_errors,
            self.settings.max_consecutive_errors,
        );
        let path = write_report(&self.reports_dir, EVALUATION_REPORT, &report)?;
        info!(
            path = %path.display(),
            compared = report.compared_pairs,
            mismatches = report.mismatches,
            longest_run = report.longest_mismatch_run,
            "Evaluation report written"
        );
        self.store.delete_pairs(&report.pairs).await?;

        let question = GateQuestion::new("Is the classifier evaluation passed?", report.passed());
        if self.decisions.resolve_gate(&question).await {
            info!("Evaluation passed");
            Ok(Verdict::Passed)
        } else {
            error!(
                mismatches = report.mismatches,
                longest_run = report.longest_mismatch_run,
                "Evaluation not passed, reconfiguration required"
            );
            Ok(Verdict::ReconfigurationRequired)
        }
    }

    /// Drive the loop until the inbox closes
    pub async fn run(mut self) -> Result<()> {
        loop {
            match self.step().await {
                Ok(StepOutcome::InboxClosed) => {
                    info!("Inbox closed, evaluation loop stopping");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Evaluation step failed"),
            }
        }
    }
}
