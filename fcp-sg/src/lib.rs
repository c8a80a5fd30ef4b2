//! fcp-sg library - Segregation system
//!
//! Buffers prepared sessions until the quota is met, gates the batch on
//! balance and coverage, then splits it into a learning set for the
//! development system.

use axum::{routing::post, Router};
use fcp_common::model::PreparedSession;
use fcp_common::transport::{health_routes, InboxSender};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod machine;
pub mod reports;
pub mod splitter;
pub mod store;

pub use machine::{MachineContext, SegregationMachine, SegregationStage, StepOutcome};

/// Module name used for health responses and the data sub-folder
pub const MODULE_NAME: &str = "segregation";

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub inbox: InboxSender<PreparedSession>,
}

impl AppState {
    pub fn new(inbox: InboxSender<PreparedSession>) -> Self {
        Self { inbox }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/prepared_session", post(api::post_prepared_session))
        .merge(health_routes("fcp-sg", env!("CARGO_PKG_VERSION")))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
