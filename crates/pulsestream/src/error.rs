// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

use thiserror::Error;

/// Error types for PulseStream operations
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// JSON encode/decode error
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid event content (fails the wire contract, not JSON syntax)
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Kafka configuration or broker error
    #[error("Kafka error: {0}")]
    Kafka(String),

    /// Publish failed after exhausting retries
    #[error("Publish to '{topic}' failed: {reason}")]
    PublishFailed {
        /// Target topic
        topic: String,
        /// Broker-side error or timeout description
        reason: String,
    },

    /// Cache operation failed in a path where degradation is not allowed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Relational store error
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rdkafka::error::KafkaError> for Error {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Error::Kafka(err.to_string())
    }
}

/// Result type for PulseStream operations
pub type Result<T> = std::result::Result<T, Error>;
