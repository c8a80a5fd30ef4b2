//! FIFO queue between the inbound listener and the control loop

use tokio::sync::mpsc;
use tracing::warn;

/// Create a connected sender/receiver pair
pub fn inbox<T>() -> (InboxSender<T>, Inbox<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxSender { tx }, Inbox { rx })
}

/// Listener-side handle; cloned into every request handler
#[derive(Debug)]
pub struct InboxSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for InboxSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T> InboxSender<T> {
    /// Enqueue without blocking
    ///
    /// Returns false only when the control loop has shut down.
    pub fn push(&self, message: T) -> bool {
        if self.tx.send(message).is_err() {
            warn!("Control loop is gone, inbound message dropped");
            return false;
        }
        true
    }
}

/// Control-loop side of the queue; owned by exactly one loop
#[derive(Debug)]
pub struct Inbox<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Inbox<T> {
    /// Suspend until the next message arrives
    ///
    /// Returns None once every sender is dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next message if one is already queued
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}
