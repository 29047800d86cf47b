// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Consumer Construction
//!
//! Builders for the two consumer flavors the pipeline uses:
//!
//! - **Processing consumers** (`processing.metrics`, `notification.alerts`):
//!   committed offsets with auto-commit disabled. A record is acknowledged
//!   with a manual `commit_message` only after the core finishes processing
//!   it; on failure the record stays uncommitted and the log redelivers.
//! - **Streaming consumers** (`streaming.metrics`, `streaming.alerts`):
//!   `auto.offset.reset=latest` so live dashboards never replay history.
//!   Offsets are auto-committed; a dropped record is gone by design.

use crate::error::Result;
use crate::kafka::{self, DEFAULT_SESSION_TIMEOUT_MS};
use rdkafka::consumer::{Consumer, StreamConsumer};

/// Offset reset policy for a fresh consumer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// Start from the earliest retained record.
    Earliest,
    /// Start from the head of the topic.
    Latest,
}

impl OffsetReset {
    const fn as_str(self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// Configuration for one pipeline consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka bootstrap servers (comma-separated)
    pub bootstrap_servers: String,
    /// Topic to subscribe
    pub topic: String,
    /// Consumer group id
    pub group_id: String,
    /// Offset reset policy for a group without committed offsets
    pub offset_reset: OffsetReset,
    /// Enable broker-side auto-commit; off for manual acknowledgement
    pub enable_auto_commit: bool,
}

impl ConsumerConfig {
    /// Manual-acknowledgement consumer: committed offsets, auto-commit off.
    #[must_use]
    pub fn processing(topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: kafka::bootstrap_servers_from_env(),
            topic: topic.into(),
            group_id: group_id.into(),
            offset_reset: OffsetReset::Earliest,
            enable_auto_commit: false,
        }
    }

    /// Live-dashboard consumer: offset-reset latest, auto-commit on.
    #[must_use]
    pub fn streaming(topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: kafka::bootstrap_servers_from_env(),
            topic: topic.into(),
            group_id: group_id.into(),
            offset_reset: OffsetReset::Latest,
            enable_auto_commit: true,
        }
    }
}

/// Create a subscribed `StreamConsumer` from a pipeline consumer config.
pub fn create_stream_consumer(config: &ConsumerConfig) -> Result<StreamConsumer> {
    let consumer: StreamConsumer =
        kafka::base_client_config(&config.bootstrap_servers, &config.group_id)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", config.offset_reset.as_str())
            .set(
                "enable.auto.commit",
                if config.enable_auto_commit { "true" } else { "false" },
            )
            .set("session.timeout.ms", DEFAULT_SESSION_TIMEOUT_MS)
            .set("enable.partition.eof", "false")
            .create()?;
    consumer.subscribe(&[config.topic.as_str()])?;
    Ok(consumer)
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::{GROUP_PROCESSING_METRICS, GROUP_STREAMING_METRICS};

    #[test]
    fn test_processing_flavor_disables_auto_commit() {
        let config = ConsumerConfig::processing("metrics.raw", GROUP_PROCESSING_METRICS);
        assert!(!config.enable_auto_commit);
        assert_eq!(config.offset_reset, OffsetReset::Earliest);
        assert_eq!(config.group_id, "processing.metrics");
    }

    #[test]
    fn test_streaming_flavor_resets_to_latest() {
        let config = ConsumerConfig::streaming("metrics.raw", GROUP_STREAMING_METRICS);
        assert!(config.enable_auto_commit);
        assert_eq!(config.offset_reset, OffsetReset::Latest);
    }
}
