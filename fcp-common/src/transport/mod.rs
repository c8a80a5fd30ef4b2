//! Message transport
//!
//! Each service runs one inbound listener that validates shape and pushes into
//! a single FIFO [`Inbox`], and one control loop that drains it. Outbound
//! delivery goes through a [`Transport`] implementation: one synchronous
//! attempt per call, success reported as a boolean, never retried here.

mod client;
mod inbox;
mod recording;
mod server;

pub use client::{DeliveryLog, PeerClient, Transport};
pub use inbox::{inbox, Inbox, InboxSender};
pub use recording::{RecordingTransport, SentMessage};
pub use server::{health_routes, serve, shutdown_signal, ApiError, ApiResult, HealthResponse};
