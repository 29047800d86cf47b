// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)
// PulseStream - Monitoring Pipeline Core

//! # PulseStream Core
//!
//! Shared core of the PulseStream monitoring pipeline: the event model and
//! JSON codec every service agrees on, alert rules and the pure threshold
//! evaluator, the Kafka producer/consumer plumbing, the cache key namespace,
//! and the backend traits the processing core orchestrates against.
//!
//! ## Pipeline
//!
//! ```text
//! agents ──HTTP──▶ ingestion ──metrics.raw──▶ processor ──alerts──▶ notifier
//!                                   │                        │
//!                                   ▼                        ▼
//!                             cache + history           streaming (SSE)
//! ```
//!
//! Four services compose the pipeline (ingestion, processing & alert,
//! streaming, and notification) connected by a durable partitioned message
//! log (Kafka, keyed by `serviceName`) and a shared key-value cache (Redis,
//! keys under `monitoring:`).
//!
//! ## Example
//!
//! ```rust
//! use pulsestream::event::{MetricEvent, MetricType};
//! use pulsestream::codec::encode_metric;
//!
//! let event = MetricEvent::new(
//!     "web",
//!     MetricType::Cpu,
//!     92.0,
//!     pulsestream::event::wire_time::parse("2026-03-14T10:00:00").unwrap(),
//! );
//! let wire = encode_metric(&event).unwrap();
//! assert!(std::str::from_utf8(&wire).unwrap().contains("\"CPU\""));
//! ```

/// Backend traits the processing core orchestrates against.
pub mod backend;
/// Encode/decode for the two wire event types.
pub mod codec;
/// Consumer construction for the pipeline's consumer groups.
pub mod consumer;
/// Environment variables and typed accessors.
pub mod env_vars;
/// Core error types and conversions.
pub mod error;
/// Event model: metric/alert events and their closed enums.
pub mod event;
/// Kafka client configuration, topic and group names.
pub mod kafka;
/// Cache key namespace builders.
pub mod keys;
/// Prometheus registration helpers.
pub mod metrics_utils;
/// Kafka producer for the two pipeline topics.
pub mod producer;
/// Alert rules and the pure threshold evaluator.
pub mod rule;
/// In-memory backends for tests.
pub mod testing;

pub use error::{Error, Result};
pub use event::{
    AlertEvent, AlertStatus, ComparisonOperator, Environment, MetricEvent, MetricType, Severity,
};
pub use kafka::{
    Topics, DEFAULT_TOPIC_ALERTS, DEFAULT_TOPIC_METRICS_RAW, GROUP_NOTIFICATION_ALERTS,
    GROUP_PROCESSING_METRICS, GROUP_STREAMING_ALERTS, GROUP_STREAMING_METRICS,
};
pub use rule::AlertRule;
