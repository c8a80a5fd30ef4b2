//! Classification control loop
//!
//! Infers a label for every prepared session with the deployed classifier
//! and routes it according to the phase gate. Deployments replace the
//! classifier without touching the phase cycle.

use fcp_common::classifier::{MlpClassifier, TrainableModel};
use fcp_common::config::{ClassificationSettings, PeerAddress};
use fcp_common::model::{LabelMessage, PreparedSession};
use fcp_common::state::StateFile;
use fcp_common::transport::{Inbox, Transport};
use fcp_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::phase::{Phase, PhaseGate};

/// Route on the evaluation system for classifier labels
pub const CLASSIFIER_LABEL_ROUTE: &str = "/label/classifier";

/// Route on the client system for production labels
pub const FAULT_RISK_ROUTE: &str = "/fault_risk";

/// Route on the client system notified once a classifier is in place
pub const DEPLOYMENT_ROUTE: &str = "/deployment";

/// Artifact id of the deployed classifier
const CLASSIFIER_ID: &str = "classifier";

/// Messages accepted by the classification listener
#[derive(Debug)]
pub enum ClassificationMessage {
    Deploy(Box<MlpClassifier>),
    Session(PreparedSession),
}

/// Where inference results go
#[derive(Debug, Clone)]
pub struct ClassificationPeers {
    pub evaluation: PeerAddress,
    pub client: Option<PeerAddress>,
}

pub struct ClassificationController<T> {
    module_dir: PathBuf,
    peers: ClassificationPeers,
    state: StateFile<PhaseGate>,
    gate: PhaseGate,
    classifier: Option<MlpClassifier>,
    inbox: Inbox<ClassificationMessage>,
    transport: T,
}

impl<T: Transport> ClassificationController<T> {
    /// Restore the phase position and any previously deployed classifier
    pub fn new(
        settings: &ClassificationSettings,
        module_dir: &Path,
        peers: ClassificationPeers,
        inbox: Inbox<ClassificationMessage>,
        transport: T,
    ) -> Result<Self> {
        std::fs::create_dir_all(module_dir)?;
        let state = StateFile::new(module_dir.join("state.json"));
        let gate = state
            .load_or(PhaseGate::new(settings.evaluation_sessions, settings.production_sessions))
            .with_quotas(settings.evaluation_sessions, settings.production_sessions);

        let classifier = match MlpClassifier::load(module_dir, CLASSIFIER_ID) {
            Ok(classifier) => {
                info!("Deployed classifier reloaded");
                Some(classifier)
            }
            Err(Error::NotFound(_)) => {
                info!("No classifier deployed yet");
                None
            }
            Err(e) => {
                warn!(error = %e, "Persisted classifier unusable, waiting for a new deployment");
                None
            }
        };

        Ok(Self {
            module_dir: module_dir.to_path_buf(),
            peers,
            state,
            gate,
            classifier,
            inbox,
            transport,
        })
    }

    pub fn phase(&self) -> Phase {
        self.gate.phase()
    }

    pub fn gate(&self) -> &PhaseGate {
        &self.gate
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// Handle one inbound message; false once the inbox is closed
    pub async fn step(&mut self) -> Result<bool> {
        let Some(message) = self.inbox.recv().await else {
            return Ok(false);
        };
        match message {
            ClassificationMessage::Deploy(classifier) => self.deploy(*classifier).await?,
            ClassificationMessage::Session(session) => self.classify(session).await?,
        }
        Ok(true)
    }

    async fn deploy(&mut self, classifier: MlpClassifier) -> Result<()> {
        if let Err(e) = classifier.validate() {
            warn!(error = %e, "Deployment refused, keeping current classifier");
            return Ok(());
        }
        classifier.persist(&self.module_dir, CLASSIFIER_ID)?;
        info!(config = %classifier.hyperparameters(), "Classifier deployed");
        self.classifier = Some(classifier);

        // Development is over; the client may reconfigure its side
        match &self.peers.client {
            Some(client) => {
                let notice = serde_json::json!({ "deployment": "done" });
                self.transport.send(client, DEPLOYMENT_ROUTE, &notice).await;
            }
            None => warn!("No client configured, deployment notice not delivered"),
        }
        Ok(())
    }

    async fn classify(&mut self, session: PreparedSession) -> Result<()> {
        let Some(classifier) = &self.classifier else {
            warn!(uuid = %session.uuid, "No classifier deployed, prepared session dropped");
            return Ok(());
        };

        let label = match classifier.predict(&session.features()) {
            Ok(label) => label,
            Err(e) => {
                error!(uuid = %session.uuid, error = %e, "Inference failed");
                return Ok(());
            }
        };
        info!(uuid = %session.uuid, %label, phase = %self.gate.phase(), "Label inferred");

        let message = LabelMessage {
            uuid: session.uuid,
            label,
            timestamp: None,
        };
        let payload = serde_json::to_value(&message)?;

        if self.gate.phase() == Phase::Evaluation {
            self.transport
                .send(&self.peers.evaluation, CLASSIFIER_LABEL_ROUTE, &payload)
                .await;
        }
        match &self.peers.client {
            Some(client) => {
                self.transport.send(client, FAULT_RISK_ROUTE, &payload).await;
            }
            None => warn!("No client configured, production label not delivered"),
        }

        if let Some(phase) = self.gate.record_session() {
            info!(%phase, "Switched phase");
        }
        self.state.save(&self.gate)
    }

    /// Drive the loop until the inbox closes
    pub async fn run(mut self) -> Result<()> {
        loop {
            match self.step().await {
                Ok(true) => {}
                Ok(false) => {
                    info!("Inbox closed, classification loop stopping");
                    return Ok(());
                }
                Err(e) => error!(error = %e, "Classification step failed"),
            }
        }
    }
}
