//! fcp-cs library - Classification system
//!
//! Holds the deployed classifier, labels incoming prepared sessions and
//! alternates between evaluation and production phases.

use axum::{routing::post, Router};
use fcp_common::transport::{health_routes, InboxSender};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod controller;
pub mod phase;

pub use controller::{ClassificationController, ClassificationMessage, ClassificationPeers};
pub use phase::{Phase, PhaseGate};

/// Module name used for health responses and the data sub-folder
pub const MODULE_NAME: &str = "classification";

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub inbox: InboxSender<ClassificationMessage>,
}

impl AppState {
    pub fn new(inbox: InboxSender<ClassificationMessage>) -> Self {
        Self { inbox }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/prepared_session", post(api::post_prepared_session))
        .route("/deploy", post(api::post_deploy))
        .merge(health_routes("fcp-cs", env!("CARGO_PKG_VERSION")))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
