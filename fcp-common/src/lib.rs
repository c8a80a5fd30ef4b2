//! # FCP Common Library
//!
//! Shared code for all fault-classification pipeline microservices:
//! - Message transport (inbound queue, outbound peer client, listener helpers)
//! - Data model (prepared sessions, learning sets, labels)
//! - Persisted state files, SQLite pool setup and decision providers
//! - Configuration loading and tracing setup
//! - Trainable classifier capability

pub mod classifier;
pub mod config;
pub mod db;
pub mod decision;
pub mod error;
pub mod logging;
pub mod model;
pub mod report;
pub mod state;
pub mod time;
pub mod transport;

pub use error::{Error, Result};
