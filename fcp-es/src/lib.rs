//! fcp-es library - Evaluation system
//!
//! Pairs classifier labels with expert labels and decides whether the
//! deployed classifier still performs well enough.

use axum::{routing::post, Router};
use fcp_common::transport::{health_routes, InboxSender};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod evaluator;
pub mod label;
pub mod report;
pub mod store;

pub use evaluator::{Evaluator, StepOutcome, Verdict};
pub use label::{LabelPair, LabelSource, SourcedLabel};

/// Module name used for health responses and the data sub-folder
pub const MODULE_NAME: &str = "evaluation";

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub inbox: InboxSender<SourcedLabel>,
}

impl AppState {
    pub fn new(inbox: InboxSender<SourcedLabel>) -> Self {
        Self { inbox }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/label/classifier", post(api::post_classifier_label))
        .route("/label/expert", post(api::post_expert_label))
        .merge(health_routes("fcp-es", env!("CARGO_PKG_VERSION")))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
