//! Error types for the alerting service

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the alerting service
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Stream errors
    #[error("Stream connection failed: {0}")]
    StreamConnection(String),

    #[error("Stream disconnected")]
    StreamDisconnected,

    #[error("Subscription failed: {0}")]
    Subscription(String),

    // Collaborator errors
    #[error("Enrichment request failed: {0}")]
    Enrichment(String),

    #[error("Enrichment timed out after {0}ms")]
    EnrichmentTimeout(u64),

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    // Tracker errors
    #[error("Token not tracked: {0}")]
    TokenNotTracked(String),

    // Persistence errors
    #[error("Snapshot persistence failed: {0}")]
    Persistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StreamConnection(_)
                | Error::StreamDisconnected
                | Error::Enrichment(_)
                | Error::EnrichmentTimeout(_)
                | Error::Notification(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Enrichment(e.to_string())
    }
}
