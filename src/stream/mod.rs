//! Stream module - PumpPortal WebSocket ingestion
//!
//! One logical subscription session, normalized into typed domain events.

pub mod client;
pub mod events;

pub use client::{ConnectionState, StreamClient, StreamCommand, StreamHandle};
pub use events::{StreamEvent, SubscriptionMessage, TokenCreated, TokenMigrated, TradeExecuted};
