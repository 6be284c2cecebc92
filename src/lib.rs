//! Pumpwatch Library
//!
//! Real-time pump.fun token monitoring: stream ingestion, per-token state
//! aggregation, composite signal scoring, deduplicated alerting, and
//! win/loss outcome tracking.

pub mod alerts;
pub mod config;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod notify;
pub mod outcome;
pub mod persistence;
pub mod scheduler;
pub mod signal;
pub mod stream;
pub mod tracker;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
