// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Backend Traits
//!
//! The seams between the pipeline core and its external collaborators. The
//! processing service orchestrates against these traits only; the Redis and
//! PostgreSQL crates implement them for production and
//! [`crate::testing`] provides in-memory implementations for tests.
//!
//! Degradation contract: cache reads return `Ok(None)` and cache writes
//! `Ok(false)` when the cache is unavailable; the core continues. The one
//! exception is [`AlertStateCache::clear_alert_state`], which must report
//! failure: resolve-path redelivery safety depends on that delete.

use crate::error::Result;
use crate::event::{AlertEvent, MetricEvent, MetricType};
use crate::rule::AlertRule;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::time::Duration;

/// TTL for an alert-state entry while the alert is ACTIVE. Long enough that
/// state survives any realistic consumer outage; the resolve path deletes
/// the entry well before expiry in normal operation.
pub const ACTIVE_ALERT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Latest-value and aggregate-stats side of the cache.
#[async_trait]
pub trait MetricCache: Send + Sync {
    /// Cache `event` as the latest value for its `(service, metricType)`.
    /// Returns `Ok(false)` when the value was not cached (degraded cache).
    async fn put_latest_metric(&self, event: &MetricEvent) -> Result<bool>;

    /// Latest cached value for a `(service, metricType)` pair.
    async fn latest_metric(
        &self,
        service: &str,
        metric_type: MetricType,
    ) -> Result<Option<MetricEvent>>;

    /// All cached latest values, optionally scoped to one service.
    async fn scan_latest_metrics(&self, service: Option<&str>) -> Result<Vec<MetricEvent>>;

    /// Current aggregate-stats hash for a window; empty when absent or the
    /// cache is degraded.
    async fn stats(
        &self,
        service: &str,
        metric_type: MetricType,
        window: &str,
    ) -> Result<HashMap<String, f64>>;

    /// Best-effort write of an aggregate-stats hash for a window.
    async fn put_stats(
        &self,
        service: &str,
        metric_type: MetricType,
        window: &str,
        stats: &HashMap<String, f64>,
    ) -> Result<bool>;
}

/// Alert-state side of the cache. Presence of an entry *is* the per-rule
/// state machine: absent = NONE, present ACTIVE entry = ACTIVE.
#[async_trait]
pub trait AlertStateCache: Send + Sync {
    /// Current alert for a `(service, alertType)` pair, if any.
    async fn alert_state(&self, service: &str, alert_type: &str) -> Result<Option<AlertEvent>>;

    /// Write the current alert state with the given TTL.
    /// Returns `Ok(false)` when the state was not cached (degraded cache).
    async fn put_alert_state(&self, alert: &AlertEvent, ttl: Duration) -> Result<bool>;

    /// Delete the alert state. Unlike the other cache writes this must
    /// surface failure: a missed delete would re-resolve on redelivery.
    async fn clear_alert_state(&self, service: &str, alert_type: &str) -> Result<()>;

    /// All currently cached alert states, optionally scoped to one service.
    async fn scan_alert_states(&self, service: Option<&str>) -> Result<Vec<AlertEvent>>;

    /// First-violation timestamp for the duration gate, if a window is open.
    async fn pending_since(
        &self,
        service: &str,
        alert_type: &str,
    ) -> Result<Option<NaiveDateTime>>;

    /// Open a duration-gate window at `first_violation`.
    async fn put_pending_since(
        &self,
        service: &str,
        alert_type: &str,
        first_violation: NaiveDateTime,
        ttl: Duration,
    ) -> Result<bool>;

    /// Close the duration-gate window. Best-effort: the key carries a TTL of
    /// twice its window, so a missed delete self-heals.
    async fn clear_pending(&self, service: &str, alert_type: &str) -> Result<()>;
}

/// Append-mostly metric history.
#[async_trait]
pub trait MetricHistory: Send + Sync {
    /// Append one metric row.
    async fn insert_metric(&self, event: &MetricEvent) -> Result<()>;
}

/// Append-mostly alert history. Rows are written once on trigger and updated
/// exactly once on resolution.
#[async_trait]
pub trait AlertHistory: Send + Sync {
    /// Append the triggered alert. Re-persisting the same `alertId` must be
    /// treated as success (redelivery safety).
    async fn insert_triggered(&self, alert: &AlertEvent) -> Result<()>;

    /// Update the single row matching `alert.alert_id` with resolution
    /// status, time and duration.
    async fn mark_resolved(&self, alert: &AlertEvent) -> Result<()>;
}

/// Queryable source of alert rules.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// All enabled rules matching `(service, metricType)`, with
    /// service-specific rules strictly before wildcard rules and insertion
    /// order preserved within each group.
    async fn find_applicable(
        &self,
        service: &str,
        metric_type: MetricType,
    ) -> Result<Vec<AlertRule>>;
}

/// Publisher endpoint of the alerts topic.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Publish an alert keyed by its service; returns `(partition, offset)`.
    async fn publish_alert(&self, alert: &AlertEvent) -> Result<(i32, i64)>;
}

#[async_trait]
impl AlertSink for crate::producer::EventProducer {
    async fn publish_alert(&self, alert: &AlertEvent) -> Result<(i32, i64)> {
        crate::producer::EventProducer::publish_alert(self, alert).await
    }
}
