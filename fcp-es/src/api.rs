//! Inbound listener routes

use axum::{extract::State, http::StatusCode, Json};
use fcp_common::model::LabelMessage;
use fcp_common::transport::{ApiError, ApiResult};
use serde_json::{json, Value};
use tracing::warn;

use crate::{AppState, LabelSource, SourcedLabel};

fn accept(state: &AppState, source: LabelSource, body: Value) -> ApiResult<(StatusCode, Json<Value>)> {
    let message: LabelMessage = serde_json::from_value(body).map_err(|e| {
        warn!(%source, error = %e, "Label rejected");
        ApiError::BadRequest(format!("Invalid label message: {}", e))
    })?;

    if !state.inbox.push(SourcedLabel { source, message }) {
        return Err(ApiError::Unavailable("evaluation loop stopped".to_string()));
    }
    Ok((StatusCode::OK, Json(json!({ "status": "queued" }))))
}

/// POST /label/classifier
pub async fn post_classifier_label(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    accept(&state, LabelSource::Classifier, body)
}

/// POST /label/expert
pub async fn post_expert_label(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    accept(&state, LabelSource::Expert, body)
}
