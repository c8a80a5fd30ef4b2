//! Inbound listener routes

use axum::{extract::State, http::StatusCode, Json};
use fcp_common::model::LearningSet;
use fcp_common::transport::{ApiError, ApiResult};
use serde_json::{json, Value};
use tracing::warn;

use crate::AppState;

/// POST /learning_sets
///
/// Accepts `{training, validation, test}`; every split must be non-empty.
pub async fn post_learning_set(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let set: LearningSet = serde_json::from_value(body).map_err(|e| {
        warn!(error = %e, "Learning set rejected");
        ApiError::BadRequest(e.to_string())
    })?;
    if !set.is_complete() {
        warn!("Learning set with an empty split rejected");
        return Err(ApiError::BadRequest(
            "training, validation and test must all be non-empty".to_string(),
        ));
    }

    if !state.inbox.push(set) {
        return Err(ApiError::Unavailable("development loop stopped".to_string()));
    }
    Ok((StatusCode::OK, Json(json!({ "status": "queued" }))))
}
