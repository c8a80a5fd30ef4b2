//! Inbound listener routes

use axum::{extract::State, http::StatusCode, Json};
use fcp_common::model::PreparedSession;
use fcp_common::transport::{ApiError, ApiResult};
use serde_json::{json, Value};
use tracing::warn;

use crate::AppState;

/// POST /prepared_session
///
/// Validates the body against the prepared-session table and queues it.
pub async fn post_prepared_session(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let session = PreparedSession::from_json(&body, true).map_err(|e| {
        warn!(error = %e, "Prepared session rejected");
        ApiError::from(e)
    })?;

    if !state.inbox.push(session) {
        return Err(ApiError::Unavailable("segregation loop stopped".to_string()));
    }
    Ok((StatusCode::OK, Json(json!({ "status": "queued" }))))
}
