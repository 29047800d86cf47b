// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! In-memory backend implementations for tests.
//!
//! These mirror the production Redis/PostgreSQL backends closely enough to
//! exercise the alert engine, aggregator and stream plumbing without live
//! infrastructure. TTLs are accepted and ignored; tests drive expiry
//! explicitly where it matters. Failure-injection flags simulate the
//! degraded paths the error-handling contract cares about.

use crate::backend::{
    AlertHistory, AlertSink, AlertStateCache, MetricCache, MetricHistory, RuleSource,
};
use crate::error::{Error, Result};
use crate::event::{AlertEvent, MetricEvent, MetricType};
use crate::rule::{self, AlertRule, WILDCARD_SERVICE};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// In-memory cache implementing both cache traits.
#[derive(Default)]
pub struct MemoryCache {
    latest: Mutex<HashMap<(String, MetricType), MetricEvent>>,
    stats: Mutex<HashMap<String, HashMap<String, f64>>>,
    alert_states: Mutex<HashMap<(String, String), AlertEvent>>,
    pending: Mutex<HashMap<(String, String), NaiveDateTime>>,
    /// Simulate an unavailable cache: reads return empty, writes not-cached.
    degraded: AtomicBool,
    /// Fail alert-state deletes (the one cache op that must surface errors).
    fail_state_deletes: AtomicBool,
}

impl MemoryCache {
    /// Fresh empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle unavailable-cache behavior.
    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::SeqCst);
    }

    /// Toggle failing alert-state deletes.
    pub fn set_fail_state_deletes(&self, fail: bool) {
        self.fail_state_deletes.store(fail, Ordering::SeqCst);
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Snapshot of the alert state for assertions.
    #[must_use]
    pub fn alert_state_snapshot(&self, service: &str, alert_type: &str) -> Option<AlertEvent> {
        self.alert_states
            .lock()
            .get(&(service.to_string(), alert_type.to_string()))
            .cloned()
    }

    /// Snapshot of a stats hash for assertions.
    #[must_use]
    pub fn stats_snapshot(&self, key: &str) -> Option<HashMap<String, f64>> {
        self.stats.lock().get(key).cloned()
    }

    /// Directly seed an alert state (test setup).
    pub fn seed_alert_state(&self, alert: AlertEvent) {
        self.alert_states
            .lock()
            .insert((alert.service_name.clone(), alert.alert_type.clone()), alert);
    }

    /// Directly seed a pending mark (test setup).
    pub fn seed_pending(&self, service: &str, alert_type: &str, first_violation: NaiveDateTime) {
        self.pending
            .lock()
            .insert((service.to_string(), alert_type.to_string()), first_violation);
    }
}

#[async_trait]
impl MetricCache for MemoryCache {
    async fn put_latest_metric(&self, event: &MetricEvent) -> Result<bool> {
        if self.is_degraded() {
            return Ok(false);
        }
        self.latest.lock().insert(
            (event.service_name.clone(), event.metric_type),
            event.clone(),
        );
        Ok(true)
    }

    async fn latest_metric(
        &self,
        service: &str,
        metric_type: MetricType,
    ) -> Result<Option<MetricEvent>> {
        if self.is_degraded() {
            return Ok(None);
        }
        Ok(self
            .latest
            .lock()
            .get(&(service.to_string(), metric_type))
            .cloned())
    }

    async fn scan_latest_metrics(&self, service: Option<&str>) -> Result<Vec<MetricEvent>> {
        if self.is_degraded() {
            return Ok(Vec::new());
        }
        let mut events: Vec<MetricEvent> = self
            .latest
            .lock()
            .iter()
            .filter(|((svc, _), _)| service.map_or(true, |s| s == svc))
            .map(|(_, event)| event.clone())
            .collect();
        events.sort_by(|a, b| {
            (a.service_name.as_str(), a.metric_type.as_str())
                .cmp(&(b.service_name.as_str(), b.metric_type.as_str()))
        });
        Ok(events)
    }

    async fn stats(
        &self,
        service: &str,
        metric_type: MetricType,
        window: &str,
    ) -> Result<HashMap<String, f64>> {
        if self.is_degraded() {
            return Ok(HashMap::new());
        }
        Ok(self
            .stats
            .lock()
            .get(&crate::keys::stats(service, metric_type, window))
            .cloned()
            .unwrap_or_default())
    }

    async fn put_stats(
        &self,
        service: &str,
        metric_type: MetricType,
        window: &str,
        stats: &HashMap<String, f64>,
    ) -> Result<bool> {
        if self.is_degraded() {
            return Ok(false);
        }
        self.stats
            .lock()
            .insert(crate::keys::stats(service, metric_type, window), stats.clone());
        Ok(true)
    }
}

#[async_trait]
impl AlertStateCache for MemoryCache {
    async fn alert_state(&self, service: &str, alert_type: &str) -> Result<Option<AlertEvent>> {
        if self.is_degraded() {
            return Ok(None);
        }
        Ok(self.alert_state_snapshot(service, alert_type))
    }

    async fn put_alert_state(&self, alert: &AlertEvent, _ttl: Duration) -> Result<bool> {
        if self.is_degraded() {
            return Ok(false);
        }
        self.seed_alert_state(alert.clone());
        Ok(true)
    }

    async fn clear_alert_state(&self, service: &str, alert_type: &str) -> Result<()> {
        if self.fail_state_deletes.load(Ordering::SeqCst) {
            return Err(Error::Cache("injected delete failure".to_string()));
        }
        self.alert_states
            .lock()
            .remove(&(service.to_string(), alert_type.to_string()));
        Ok(())
    }

    async fn scan_alert_states(&self, service: Option<&str>) -> Result<Vec<AlertEvent>> {
        if self.is_degraded() {
            return Ok(Vec::new());
        }
        let mut alerts: Vec<AlertEvent> = self
            .alert_states
            .lock()
            .iter()
            .filter(|((svc, _), _)| service.map_or(true, |s| s == svc))
            .map(|(_, alert)| alert.clone())
            .collect();
        alerts.sort_by(|a, b| {
            (a.service_name.as_str(), a.alert_type.as_str())
                .cmp(&(b.service_name.as_str(), b.alert_type.as_str()))
        });
        Ok(alerts)
    }

    async fn pending_since(
        &self,
        service: &str,
        alert_type: &str,
    ) -> Result<Option<NaiveDateTime>> {
        if self.is_degraded() {
            return Ok(None);
        }
        Ok(self
            .pending
            .lock()
            .get(&(service.to_string(), alert_type.to_string()))
            .copied())
    }

    async fn put_pending_since(
        &self,
        service: &str,
        alert_type: &str,
        first_violation: NaiveDateTime,
        _ttl: Duration,
    ) -> Result<bool> {
        if self.is_degraded() {
            return Ok(false);
        }
        self.seed_pending(service, alert_type, first_violation);
        Ok(true)
    }

    async fn clear_pending(&self, service: &str, alert_type: &str) -> Result<()> {
        self.pending
            .lock()
            .remove(&(service.to_string(), alert_type.to_string()));
        Ok(())
    }
}

/// In-memory metric history.
#[derive(Default)]
pub struct MemoryMetricHistory {
    rows: Mutex<Vec<MetricEvent>>,
    fail_inserts: AtomicBool,
}

impl MemoryMetricHistory {
    /// Fresh empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failing inserts.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all rows.
    #[must_use]
    pub fn rows(&self) -> Vec<MetricEvent> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl MetricHistory for MemoryMetricHistory {
    async fn insert_metric(&self, event: &MetricEvent) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Error::Store("injected insert failure".to_string()));
        }
        self.rows.lock().push(event.clone());
        Ok(())
    }
}

/// In-memory alert history with unique-`alertId` semantics.
#[derive(Default)]
pub struct MemoryAlertHistory {
    rows: Mutex<Vec<AlertEvent>>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
}

impl MemoryAlertHistory {
    /// Fresh empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failing inserts.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Toggle failing resolution updates.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all rows.
    #[must_use]
    pub fn rows(&self) -> Vec<AlertEvent> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl AlertHistory for MemoryAlertHistory {
    async fn insert_triggered(&self, alert: &AlertEvent) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Error::Store("injected insert failure".to_string()));
        }
        let mut rows = self.rows.lock();
        // Unique index on alert_id: re-persisting the same alert is success.
        if rows.iter().any(|row| row.alert_id == alert.alert_id) {
            return Ok(());
        }
        rows.push(alert.clone());
        Ok(())
    }

    async fn mark_resolved(&self, alert: &AlertEvent) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::Store("injected update failure".to_string()));
        }
        let mut rows = self.rows.lock();
        // The single permitted history mutation: status, resolvedAt, duration.
        if let Some(row) = rows.iter_mut().find(|row| row.alert_id == alert.alert_id) {
            row.status = alert.status;
            row.resolved_at = alert.resolved_at;
            row.duration_seconds = alert.duration_seconds;
        }
        Ok(())
    }
}

/// In-memory rule source applying the wildcard-ordering contract.
#[derive(Default)]
pub struct MemoryRules {
    rules: Mutex<Vec<AlertRule>>,
}

impl MemoryRules {
    /// Source seeded with the given rules, in insertion order.
    #[must_use]
    pub fn with_rules(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }

    /// Append a rule.
    pub fn push(&self, rule: AlertRule) {
        self.rules.lock().push(rule);
    }
}

#[async_trait]
impl RuleSource for MemoryRules {
    async fn find_applicable(
        &self,
        service: &str,
        metric_type: MetricType,
    ) -> Result<Vec<AlertRule>> {
        let mut applicable: Vec<AlertRule> = self
            .rules
            .lock()
            .iter()
            .filter(|rule| {
                rule.enabled
                    && rule.metric_type == metric_type
                    && (rule.service_name == service || rule.service_name == WILDCARD_SERVICE)
            })
            .cloned()
            .collect();
        rule::order_for_evaluation(&mut applicable);
        Ok(applicable)
    }
}

/// Capturing alert sink standing in for the alerts topic.
#[derive(Default)]
pub struct MemoryAlertSink {
    published: Mutex<Vec<AlertEvent>>,
    fail: AtomicBool,
}

impl MemoryAlertSink {
    /// Fresh empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failing publishes.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of published alerts, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<AlertEvent> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn publish_alert(&self, alert: &AlertEvent) -> Result<(i32, i64)> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::PublishFailed {
                topic: "alerts".to_string(),
                reason: "injected publish failure".to_string(),
            });
        }
        let mut published = self.published.lock();
        published.push(alert.clone());
        Ok((0, (published.len() - 1) as i64))
    }
}
