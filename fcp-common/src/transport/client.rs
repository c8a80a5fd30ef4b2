//! Outbound delivery to peer services

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::PeerAddress;
use crate::{Error, Result};

/// Request timeout for every outbound call
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound capability handed to each control loop
///
/// Every call is a single delivery attempt. Failures are logged by the
/// implementation and surfaced as `false`; the caller decides whether that
/// is fatal.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON payload to `route` on `peer`
    async fn send(&self, peer: &PeerAddress, route: &str, payload: &Value) -> bool;

    /// POST a file as multipart field `file` to `route` on `peer`
    async fn send_file(&self, peer: &PeerAddress, route: &str, file_path: &Path) -> bool;
}

/// Send timestamps keyed by payload id, for diagnostics only
#[derive(Debug, Clone, Default)]
pub struct DeliveryLog {
    entries: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl DeliveryLog {
    pub fn record(&self, id: String, at: DateTime<Utc>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id, at);
        }
    }

    pub fn get(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().ok().and_then(|e| e.get(id).copied())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// HTTP implementation of [`Transport`]
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    instrumented_routes: Arc<HashSet<String>>,
    delivery_log: DeliveryLog,
}

impl PeerClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            instrumented_routes: Arc::new(HashSet::new()),
            delivery_log: DeliveryLog::default(),
        })
    }

    /// Record send timestamps for successful deliveries to these routes
    pub fn with_instrumented_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instrumented_routes = Arc::new(
            routes
                .into_iter()
                .map(|r| {
                    let route: String = r.into();
                    normalize_route(&route)
                })
                .collect(),
        );
        self
    }

    pub fn delivery_log(&self) -> &DeliveryLog {
        &self.delivery_log
    }

    fn url(peer: &PeerAddress, route: &str) -> String {
        format!("{}{}", peer.base_url(), normalize_route(route))
    }

    fn record_if_instrumented(&self, route: &str, payload: &Value) {
        if !self.instrumented_routes.contains(&normalize_route(route)) {
            return;
        }
        if let Some(id) = payload_id(payload) {
            self.delivery_log.record(id, crate::time::now());
        }
    }

    async fn check_response(url: &str, response: reqwest::Response) -> bool {
        let status = response.status();
        if status.is_success() {
            return true;
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<Value>(&body) {
            Ok(json) => {
                let message = extract_error_message(&json).unwrap_or_else(|| "unknown".to_string());
                warn!(%url, status = status.as_u16(), "Sending error: {}", message);
            }
            Err(_) => {
                warn!(%url, status = status.as_u16(), "Non-JSON error response: {}", body.trim());
            }
        }
        false
    }
}

#[async_trait]
impl Transport for PeerClient {
    async fn send(&self, peer: &PeerAddress, route: &str, payload: &Value) -> bool {
        let url = Self::url(peer, route);
        debug!(%url, "Sending JSON message");

        let response = match self.http.post(&url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "Endpoint system unreachable");
                return false;
            }
        };

        if !Self::check_response(&url, response).await {
            return false;
        }
        self.record_if_instrumented(route, payload);
        true
    }

    async fn send_file(&self, peer: &PeerAddress, route: &str, file_path: &Path) -> bool {
        let url = Self::url(peer, route);

        let bytes = match tokio::fs::read(file_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(path = %file_path.display(), error = %e, "Cannot read file for upload");
                return false;
            }
        };
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());

        info!(%url, file = %file_name, size_bytes = bytes.len(), "Uploading file");
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        match self.http.post(&url).multipart(form).send().await {
            Ok(response) => Self::check_response(&url, response).await,
            Err(e) => {
                warn!(%url, error = %e, "Endpoint system unreachable");
                false
            }
        }
    }
}

fn normalize_route(route: &str) -> String {
    format!("/{}", route.trim_start_matches('/'))
}

/// Id of a JSON payload, looked up under the keys producers use
fn payload_id(payload: &Value) -> Option<String> {
    ["UUID", "uuid", "id"].iter().find_map(|key| match payload.get(*key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Error text from `{"error": "..."}` or `{"error": {"message": "..."}}`
fn extract_error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj.get("message").and_then(Value::as_str).map(str::to_string),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_route() {
        assert_eq!(normalize_route("learning_sets"), "/learning_sets");
        assert_eq!(normalize_route("/label/expert"), "/label/expert");
    }

    #[test]
    fn test_payload_id_lookup() {
        assert_eq!(payload_id(&json!({"UUID": "abc"})), Some("abc".to_string()));
        assert_eq!(payload_id(&json!({"uuid": 12})), Some("12".to_string()));
        assert_eq!(payload_id(&json!({"training": []})), None);
    }

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(extract_error_message(&json!({"error": "bad"})), Some("bad".to_string()));
        assert_eq!(
            extract_error_message(&json!({"error": {"code": "X", "message": "nested"}})),
            Some("nested".to_string())
        );
        assert_eq!(extract_error_message(&json!({})), None);
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_a_soft_failure() {
        let client = PeerClient::new().unwrap();
        // Port 9 (discard) on localhost is not served in test environments
        let peer = PeerAddress::new("127.0.0.1", 9);
        assert!(!client.send(&peer, "/learning_sets", &json!({})).await);
        assert!(client.delivery_log().is_empty());
    }

    #[tokio::test]
    async fn test_missing_upload_file_is_a_soft_failure() {
        let client = PeerClient::new().unwrap();
        let peer = PeerAddress::new("127.0.0.1", 9);
        assert!(!client.send_file(&peer, "/deploy", Path::new("/nonexistent/NN0.json")).await);
    }
}
