// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Kafka Client Configuration
//!
//! Shared `ClientConfig` assembly and topic/group names for the message log.
//! All four services build their clients through this module so broker
//! settings stay uniform.
//!
//! Partitioning contract: both topics are keyed by `serviceName`, so every
//! record for one service lands on one partition and is delivered to one
//! member of a consumer group in publish order.

use crate::env_vars;
use rdkafka::config::ClientConfig;

// =============================================================================
// Topic and consumer-group names
// =============================================================================

/// Default raw-metrics topic (MetricEvent JSON, key = serviceName).
pub const DEFAULT_TOPIC_METRICS_RAW: &str = "metrics.raw";
/// Default alerts topic (AlertEvent JSON, key = serviceName).
pub const DEFAULT_TOPIC_ALERTS: &str = "alerts";

/// Processing service consumer group (manual acknowledgement).
pub const GROUP_PROCESSING_METRICS: &str = "processing.metrics";
/// Notification service consumer group (manual acknowledgement).
pub const GROUP_NOTIFICATION_ALERTS: &str = "notification.alerts";
/// Streaming service metrics group (offset-reset = latest).
pub const GROUP_STREAMING_METRICS: &str = "streaming.metrics";
/// Streaming service alerts group (offset-reset = latest).
pub const GROUP_STREAMING_ALERTS: &str = "streaming.alerts";

// =============================================================================
// Timeout constants
// =============================================================================

/// Consumer group session timeout in milliseconds.
///
/// 30 seconds tolerates long GC pauses and rebalances without dropping
/// members; matches the broker-side default.
pub const DEFAULT_SESSION_TIMEOUT_MS: &str = "30000";

/// Producer delivery timeout in seconds. Generous enough for broker
/// acknowledgment under load while still detecting failures.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;

/// Resolved topic names for the two pipeline topics.
#[derive(Debug, Clone)]
pub struct Topics {
    /// Raw-metrics topic name.
    pub metrics_raw: String,
    /// Alerts topic name.
    pub alerts: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            metrics_raw: DEFAULT_TOPIC_METRICS_RAW.to_string(),
            alerts: DEFAULT_TOPIC_ALERTS.to_string(),
        }
    }
}

impl Topics {
    /// Load topic names from `KAFKA_TOPIC_METRICS_RAW` / `KAFKA_TOPIC_ALERTS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            metrics_raw: env_vars::env_string_or_default(
                env_vars::KAFKA_TOPIC_METRICS_RAW,
                DEFAULT_TOPIC_METRICS_RAW,
            ),
            alerts: env_vars::env_string_or_default(
                env_vars::KAFKA_TOPIC_ALERTS,
                DEFAULT_TOPIC_ALERTS,
            ),
        }
    }
}

/// Bootstrap servers from `KAFKA_BROKERS` (falling back to
/// `KAFKA_BOOTSTRAP_SERVERS`), defaulting to localhost.
#[must_use]
pub fn bootstrap_servers_from_env() -> String {
    env_vars::env_string_one_of_or_default(
        env_vars::KAFKA_BROKERS,
        env_vars::KAFKA_BOOTSTRAP_SERVERS,
        "localhost:9092",
    )
}

/// Base client configuration shared by producers and consumers.
#[must_use]
pub fn base_client_config(bootstrap_servers: &str, client_id: &str) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", bootstrap_servers)
        .set("client.id", client_id);
    config
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topics() {
        let topics = Topics::default();
        assert_eq!(topics.metrics_raw, "metrics.raw");
        assert_eq!(topics.alerts, "alerts");
    }

    #[test]
    fn test_base_client_config_sets_bootstrap() {
        let config = base_client_config("broker-1:9092,broker-2:9092", "pulsestream-test");
        assert_eq!(
            config.get("bootstrap.servers"),
            Some("broker-1:9092,broker-2:9092")
        );
        assert_eq!(config.get("client.id"), Some("pulsestream-test"));
    }
}
