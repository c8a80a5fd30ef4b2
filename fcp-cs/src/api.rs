//! Inbound listener routes

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use fcp_common::classifier::MlpClassifier;
use fcp_common::model::PreparedSession;
use fcp_common::transport::{ApiError, ApiResult};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{AppState, ClassificationMessage};

fn enqueue(state: &AppState, message: ClassificationMessage) -> ApiResult<(StatusCode, Json<Value>)> {
    if !state.inbox.push(message) {
        return Err(ApiError::Unavailable("classification loop stopped".to_string()));
    }
    Ok((StatusCode::OK, Json(json!({ "status": "queued" }))))
}

/// POST /prepared_session
///
/// Production traffic carries no label, so it is optional here.
pub async fn post_prepared_session(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let session = PreparedSession::from_json(&body, false).map_err(|e| {
        warn!(error = %e, "Prepared session rejected");
        ApiError::from(e)
    })?;
    enqueue(&state, ClassificationMessage::Session(session))
}

/// POST /deploy
///
/// Multipart upload with the serialized classifier in field `file`.
pub async fn post_deploy(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(ApiError::BadRequest("No selected file".to_string()));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Cannot read uploaded file: {}", e)))?;
        let classifier: MlpClassifier = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(file = %file_name, error = %e, "Uploaded classifier rejected");
            ApiError::BadRequest(format!("Invalid classifier file: {}", e))
        })?;
        classifier.validate().map_err(|e| {
            warn!(file = %file_name, error = %e, "Uploaded classifier rejected");
            ApiError::BadRequest(format!("Invalid classifier file: {}", e))
        })?;

        info!(file = %file_name, size_bytes = bytes.len(), "Classifier received");
        return enqueue(&state, ClassificationMessage::Deploy(Box::new(classifier)));
    }

    Err(ApiError::BadRequest("No file part".to_string()))
}
