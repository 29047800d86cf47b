// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Event Producer
//!
//! Kafka producer for the two pipeline topics. Records are keyed by
//! `serviceName`, so every metric and alert for one service hashes to the
//! same partition and is consumed in publish order.
//!
//! ## Delivery Semantics
//!
//! Application-level retry with idempotence enabled prevents duplicates from
//! broker-side retries, but a timeout after the broker persisted a record
//! can still yield a duplicate on the application retry. Consumers are
//! duplicate-tolerant by contract: triggers are cache-guarded and resolves
//! idempotent, so at-least-once is sufficient here.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pulsestream::producer::{EventProducer, ProducerConfig};
//! use pulsestream::event::{MetricEvent, MetricType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let producer = EventProducer::new(ProducerConfig::from_env())?;
//!     let event = MetricEvent::new(
//!         "web",
//!         MetricType::Cpu,
//!         92.0,
//!         chrono::Utc::now().naive_utc(),
//!     );
//!     let (partition, offset) = producer.publish_metric(&event).await?;
//!     println!("delivered to partition {partition} at offset {offset}");
//!     Ok(())
//! }
//! ```

use crate::codec::{encode_alert, encode_metric};
use crate::error::{Error, Result};
use crate::event::{AlertEvent, MetricEvent};
use crate::kafka::{self, Topics, DEFAULT_DELIVERY_TIMEOUT_SECS};
use crate::metrics_utils::{
    int_counter, METRIC_EVENTS_PUBLISHED_TOTAL, METRIC_PUBLISH_FAILURES_TOTAL,
    METRIC_PUBLISH_RETRIES_TOTAL,
};
use prometheus::IntCounter;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{error, warn};

static EVENTS_PUBLISHED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    int_counter(
        METRIC_EVENTS_PUBLISHED_TOTAL,
        "Total number of events successfully published to Kafka",
    )
});
static PUBLISH_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    int_counter(
        METRIC_PUBLISH_FAILURES_TOTAL,
        "Total number of Kafka publish failures after retries",
    )
});
static PUBLISH_RETRIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    int_counter(
        METRIC_PUBLISH_RETRIES_TOTAL,
        "Total number of Kafka publish retries",
    )
});

/// Configuration for producer retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (default: 3)
    pub max_attempts: u32,
    /// Base delay for exponential backoff in milliseconds (default: 100ms)
    pub base_delay_ms: u64,
    /// Maximum delay cap for exponential backoff in milliseconds (default: 5000ms)
    pub max_delay_ms: u64,
    /// Enable retry (default: true)
    pub enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            enabled: true,
        }
    }
}

/// Configuration for the event producer
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Kafka bootstrap servers (comma-separated)
    pub bootstrap_servers: String,

    /// Topic names for the two pipeline topics
    pub topics: Topics,

    /// Per-send delivery timeout
    pub timeout: Duration,

    /// Enable idempotent producer
    pub enable_idempotence: bool,

    /// Retry configuration for transient send failures
    pub retry_config: RetryConfig,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topics: Topics::default(),
            timeout: Duration::from_secs(DEFAULT_DELIVERY_TIMEOUT_SECS),
            enable_idempotence: true,
            retry_config: RetryConfig::default(),
        }
    }
}

impl ProducerConfig {
    /// Load producer configuration from environment variables
    /// (`KAFKA_BROKERS`, `KAFKA_TOPIC_METRICS_RAW`, `KAFKA_TOPIC_ALERTS`).
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            bootstrap_servers: kafka::bootstrap_servers_from_env(),
            topics: Topics::from_env(),
            ..Default::default()
        }
    }
}

/// Kafka producer shared by ingestion (metrics) and processing (alerts).
pub struct EventProducer {
    producer: FutureProducer,
    config: ProducerConfig,
}

impl EventProducer {
    /// Create a producer from configuration.
    pub fn new(config: ProducerConfig) -> Result<Self> {
        let producer: FutureProducer =
            kafka::base_client_config(&config.bootstrap_servers, "pulsestream-producer")
                .set(
                    "enable.idempotence",
                    if config.enable_idempotence { "true" } else { "false" },
                )
                .set("max.in.flight.requests.per.connection", "5")
                .set(
                    "message.timeout.ms",
                    (config.timeout.as_millis()).to_string(),
                )
                .create()?;
        Ok(Self { producer, config })
    }

    /// Publish a metric event to the raw-metrics topic, keyed by service.
    pub async fn publish_metric(&self, event: &MetricEvent) -> Result<(i32, i64)> {
        let payload = encode_metric(event)?;
        let topic = self.config.topics.metrics_raw.clone();
        self.send(&topic, &event.service_name, payload).await
    }

    /// Publish an alert event to the alerts topic, keyed by service.
    pub async fn publish_alert(&self, event: &AlertEvent) -> Result<(i32, i64)> {
        let payload = encode_alert(event)?;
        let topic = self.config.topics.alerts.clone();
        self.send(&topic, &event.service_name, payload).await
    }

    /// Send one record with bounded exponential-backoff retry.
    ///
    /// The send is a failure iff the underlying future reports a broker-side
    /// error or a timeout; success returns the assigned `(partition, offset)`.
    async fn send(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(i32, i64)> {
        let retry = &self.config.retry_config;
        let max_attempts = if retry.enabled {
            retry.max_attempts.max(1)
        } else {
            1
        };
        let mut last_error = None;

        for attempt in 0..max_attempts {
            // FutureRecord is not Clone; build fresh per attempt.
            let record = FutureRecord::to(topic).key(key).payload(&payload);
            match self
                .producer
                .send(record, Timeout::After(self.config.timeout))
                .await
            {
                Ok((partition, offset)) => {
                    EVENTS_PUBLISHED_TOTAL.inc();
                    return Ok((partition, offset));
                }
                Err((err, _record)) => {
                    if attempt + 1 < max_attempts {
                        PUBLISH_RETRIES_TOTAL.inc();
                        let exp = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
                        let base = retry.base_delay_ms.saturating_mul(exp);
                        let delay = base.min(retry.max_delay_ms);
                        // 0-25% jitter to avoid thundering herd on broker recovery.
                        let jitter = (delay as f64 * 0.25 * rand::random::<f64>()) as u64;
                        warn!(
                            topic,
                            key,
                            attempt = attempt + 1,
                            max_attempts,
                            delay_ms = delay + jitter,
                            error = %err,
                            "Kafka publish failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay + jitter)).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        PUBLISH_FAILURES_TOTAL.inc();
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        error!(topic, key, attempts = max_attempts, reason = %reason, "Kafka publish failed after all retries");
        Err(Error::PublishFailed {
            topic: topic.to_string(),
            reason,
        })
    }

    /// Flush buffered records, e.g. on graceful shutdown.
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| Error::Kafka(format!("Failed to join flush task: {e}")))?
            .map_err(|e| Error::Kafka(format!("Failed to flush producer: {e}")))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert!(retry.enabled);
        assert!(retry.base_delay_ms < retry.max_delay_ms);
    }

    #[test]
    fn test_config_default_topics() {
        let config = ProducerConfig::default();
        assert_eq!(config.topics.metrics_raw, "metrics.raw");
        assert_eq!(config.topics.alerts, "alerts");
        assert!(config.enable_idempotence);
    }
}
