//! In-process transport that records deliveries instead of sending them

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::Transport;
use crate::config::PeerAddress;

/// One recorded delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub peer: PeerAddress,
    pub route: String,
    pub payload: Option<Value>,
    /// Uploaded file path and its bytes at upload time
    pub file: Option<(PathBuf, Vec<u8>)>,
}

/// Records every attempt; answers with a switchable success flag
///
/// Used by service tests and dry runs in place of [`super::PeerClient`].
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    accepting: Arc<AtomicBool>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent attempts succeed (`true`) or fail (`false`)
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Every attempt so far, including failed ones
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Attempts addressed to `route`
    pub fn sent_to(&self, route: &str) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.route == route).collect()
    }

    fn record(&self, message: SentMessage) -> bool {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
        self.accepting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, peer: &PeerAddress, route: &str, payload: &Value) -> bool {
        self.record(SentMessage {
            peer: peer.clone(),
            route: route.to_string(),
            payload: Some(payload.clone()),
            file: None,
        })
    }

    async fn send_file(&self, peer: &PeerAddress, route: &str, file_path: &Path) -> bool {
        let bytes = match tokio::fs::read(file_path).await {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        self.record(SentMessage {
            peer: peer.clone(),
            route: route.to_string(),
            payload: None,
            file: Some((file_path.to_path_buf(), bytes)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_attempts_and_honours_flag() {
        let transport = RecordingTransport::new();
        let peer = PeerAddress::new("127.0.0.1", 5802);
        assert!(transport.send(&peer, "/learning_sets", &json!({"a": 1})).await);

        transport.set_accepting(false);
        assert!(!transport.send(&peer, "/learning_sets", &json!({"a": 2})).await);

        let sent = transport.sent_to("/learning_sets");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload, Some(json!({"a": 2})));
    }
}
