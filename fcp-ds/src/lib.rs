//! fcp-ds library - Development system
//!
//! Receives learning sets, trains a first classifier with averaged
//! hyperparameters, grid-searches the configured space for the best five
//! candidates and deploys the chosen winner to the classification system.

use axum::{routing::post, Router};
use fcp_common::model::LearningSet;
use fcp_common::transport::{health_routes, InboxSender};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod hyperparams;
pub mod orchestrator;
pub mod reports;
pub mod search;

pub use orchestrator::{DevelopmentOrchestrator, DevelopmentPaths, Flow, Stage};

/// Module name used for the data sub-folder
pub const MODULE_NAME: &str = "development";

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub inbox: InboxSender<LearningSet>,
}

impl AppState {
    pub fn new(inbox: InboxSender<LearningSet>) -> Self {
        Self { inbox }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/learning_sets", post(api::post_learning_set))
        .merge(health_routes("fcp-ds", env!("CARGO_PKG_VERSION")))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
