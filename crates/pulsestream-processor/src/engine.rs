// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Alert Engine
//!
//! The per-`(service, alertType)` state machine. States are `NONE` and
//! `ACTIVE`, represented entirely by the presence and content of the cached
//! alert-state entry; the engine holds no process-local state, so any group
//! member that inherits a partition inherits the state with it.
//!
//! ```text
//!            fired ∧ window elapsed
//!   NONE ───────────────────────────▶ ACTIVE
//!    ▲                                  │
//!    └──────────── ¬fired ──────────────┘
//! ```
//!
//! For each incoming metric the applicable rules are evaluated
//! **sequentially**: rule N's cache write must be visible to rule N+1's read
//! for the same `(service, alertType)`. Cross-service interleaving is
//! already serialized by the `serviceName` partition key, which is what
//! makes the at-most-one-ACTIVE invariant hold without a distributed lock.
//!
//! Write ordering on trigger is cache → history → publish: once the ACTIVE
//! entry is cached, a redelivery of the same metric reads ACTIVE and stays
//! quiet, whatever happened to the later steps.

use chrono::{NaiveDateTime, Utc};
use pulsestream::backend::{
    AlertHistory, AlertSink, AlertStateCache, RuleSource, ACTIVE_ALERT_TTL,
};
use pulsestream::error::Result;
use pulsestream::event::{AlertEvent, AlertStatus, MetricEvent};
use pulsestream::rule::AlertRule;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What one metric did to the alert state.
#[derive(Debug, Default)]
pub struct EngineReport {
    /// Alerts newly triggered by this metric.
    pub triggered: Vec<AlertEvent>,
    /// Alerts resolved by this metric.
    pub resolved: Vec<AlertEvent>,
    /// Rule evaluations withheld by the duration gate.
    pub gated: usize,
}

/// Orchestrates rule lookup, state transition, cache, persistence and
/// publish for every incoming metric.
pub struct AlertEngine {
    rules: Arc<dyn RuleSource>,
    state: Arc<dyn AlertStateCache>,
    history: Arc<dyn AlertHistory>,
    sink: Arc<dyn AlertSink>,
}

impl AlertEngine {
    /// Assemble an engine over its four seams.
    pub fn new(
        rules: Arc<dyn RuleSource>,
        state: Arc<dyn AlertStateCache>,
        history: Arc<dyn AlertHistory>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            rules,
            state,
            history,
            sink,
        }
    }

    /// Evaluate every applicable rule against `metric`.
    ///
    /// An `Err` means the metric must not be acknowledged: either the rule
    /// lookup failed, or a resolve-path write the contract depends on
    /// failed, or a publish failed. Trigger-path history writes and all
    /// plain cache writes degrade without failing the metric.
    pub async fn process(&self, metric: &MetricEvent) -> Result<EngineReport> {
        self.process_at(metric, Utc::now().naive_utc()).await
    }

    pub(crate) async fn process_at(
        &self,
        metric: &MetricEvent,
        now: NaiveDateTime,
    ) -> Result<EngineReport> {
        let rules = self
            .rules
            .find_applicable(&metric.service_name, metric.metric_type)
            .await?;
        let mut report = EngineReport::default();

        for rule in rules {
            let alert_type = rule.alert_type();
            let prior = self
                .state
                .alert_state(&metric.service_name, &alert_type)
                .await?;
            let fired = rule.matches(metric.metric_value);
            let active = prior.as_ref().is_some_and(AlertEvent::is_active);

            match (fired, active, prior) {
                (true, false, _) => {
                    if self.sustained(&rule, metric, &alert_type, now).await? {
                        let alert = self.trigger(&rule, metric, &alert_type, now).await?;
                        report.triggered.push(alert);
                    } else {
                        report.gated += 1;
                    }
                }
                (false, true, Some(prior)) => {
                    self.discard_pending(metric, &alert_type).await;
                    let alert = self.resolve(prior, metric, now).await?;
                    report.resolved.push(alert);
                }
                (false, _, _) => {
                    // Condition clear and nothing active: just forget any
                    // half-open duration window.
                    self.discard_pending(metric, &alert_type).await;
                }
                (true, true, _) => {
                    debug!(
                        service = %metric.service_name,
                        alert_type = %alert_type,
                        "condition still violated while ACTIVE; no-op"
                    );
                }
            }
        }
        Ok(report)
    }

    /// Duration gate: has the condition held for the rule's sustain window?
    ///
    /// A rule without a window fires immediately. Otherwise the observed
    /// first-violation time lives in the pending cache key (TTL twice the
    /// window, so an idle stream forgets a stale mark on its own).
    async fn sustained(
        &self,
        rule: &AlertRule,
        metric: &MetricEvent,
        alert_type: &str,
        now: NaiveDateTime,
    ) -> Result<bool> {
        if rule.duration_minutes == 0 {
            return Ok(true);
        }
        match self
            .state
            .pending_since(&metric.service_name, alert_type)
            .await?
        {
            Some(first_violation) => Ok(rule.window_elapsed(first_violation, now)),
            None => {
                let ttl = Duration::from_secs(u64::from(rule.duration_minutes) * 2 * 60);
                self.state
                    .put_pending_since(&metric.service_name, alert_type, now, ttl)
                    .await?;
                debug!(
                    service = %metric.service_name,
                    alert_type,
                    window_minutes = rule.duration_minutes,
                    "duration window opened"
                );
                Ok(false)
            }
        }
    }

    async fn discard_pending(&self, metric: &MetricEvent, alert_type: &str) {
        if let Err(e) = self
            .state
            .clear_pending(&metric.service_name, alert_type)
            .await
        {
            warn!(
                service = %metric.service_name,
                alert_type,
                error = %e,
                "failed to clear pending mark; TTL will reap it"
            );
        }
    }

    /// TRIGGER: build, cache, persist, publish, in that order.
    async fn trigger(
        &self,
        rule: &AlertRule,
        metric: &MetricEvent,
        alert_type: &str,
        now: NaiveDateTime,
    ) -> Result<AlertEvent> {
        let alert = build_alert(rule, metric, alert_type, now);

        // Cache first: the ACTIVE entry is what keeps a redelivery of this
        // metric from triggering twice.
        let cached = self.state.put_alert_state(&alert, ACTIVE_ALERT_TTL).await?;
        if !cached {
            warn!(
                service = %alert.service_name,
                alert_type,
                "alert state not cached; redelivery of this metric may re-trigger"
            );
        }
        self.discard_pending(metric, alert_type).await;

        if let Err(e) = self.history.insert_triggered(&alert).await {
            // Cache is the source of truth for state; history is audit.
            warn!(alert_id = %alert.alert_id, error = %e, "alert history insert failed; continuing");
        }

        self.sink.publish_alert(&alert).await?;
        info!(
            service = %alert.service_name,
            alert_type,
            alert_id = %alert.alert_id,
            current_value = metric.metric_value,
            threshold = rule.threshold_value,
            "alert triggered"
        );
        Ok(alert)
    }

    /// RESOLVE: mutate the prior alert in place, delete the cache entry,
    /// update its history row, publish.
    ///
    /// The cache delete and the history update must both succeed; either
    /// failure propagates so the metric is redelivered.
    async fn resolve(
        &self,
        mut prior: AlertEvent,
        metric: &MetricEvent,
        now: NaiveDateTime,
    ) -> Result<AlertEvent> {
        prior.resolve(now, metric.metric_value);

        self.state
            .clear_alert_state(&prior.service_name, &prior.alert_type)
            .await?;
        self.history.mark_resolved(&prior).await?;
        self.sink.publish_alert(&prior).await?;
        info!(
            service = %prior.service_name,
            alert_type = %prior.alert_type,
            alert_id = %prior.alert_id,
            duration_seconds = prior.duration_seconds,
            "alert resolved"
        );
        Ok(prior)
    }
}

fn build_alert(
    rule: &AlertRule,
    metric: &MetricEvent,
    alert_type: &str,
    now: NaiveDateTime,
) -> AlertEvent {
    let mut metadata = HashMap::new();
    metadata.insert("ruleName".to_string(), rule.rule_name.clone());
    AlertEvent {
        alert_id: Uuid::new_v4(),
        service_name: metric.service_name.clone(),
        alert_type: alert_type.to_string(),
        severity: rule.severity,
        status: AlertStatus::Active,
        message: format!(
            "{} {} threshold exceeded: current={}, threshold={}",
            metric.metric_type.display_name(),
            rule.comparison_operator.symbol(),
            metric.metric_value,
            rule.threshold_value,
        ),
        description: rule.description.clone(),
        threshold_value: rule.threshold_value,
        current_value: metric.metric_value,
        triggered_at: now,
        resolved_at: None,
        duration_seconds: None,
        hostname: metric.hostname.clone(),
        environment: metric.environment,
        metadata: Some(metadata),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;
    use pulsestream::event::{wire_time, ComparisonOperator, MetricType, Severity};
    use pulsestream::testing::{MemoryAlertHistory, MemoryAlertSink, MemoryCache, MemoryRules};

    struct Fixture {
        engine: AlertEngine,
        cache: Arc<MemoryCache>,
        history: Arc<MemoryAlertHistory>,
        sink: Arc<MemoryAlertSink>,
    }

    fn fixture(rules: Vec<AlertRule>) -> Fixture {
        let cache = Arc::new(MemoryCache::new());
        let history = Arc::new(MemoryAlertHistory::new());
        let sink = Arc::new(MemoryAlertSink::new());
        let engine = AlertEngine::new(
            Arc::new(MemoryRules::with_rules(rules)),
            Arc::clone(&cache) as Arc<dyn AlertStateCache>,
            Arc::clone(&history) as Arc<dyn AlertHistory>,
            Arc::clone(&sink) as Arc<dyn AlertSink>,
        );
        Fixture {
            engine,
            cache,
            history,
            sink,
        }
    }

    fn rule(
        name: &str,
        service: &str,
        metric_type: MetricType,
        threshold: f64,
        severity: Severity,
    ) -> AlertRule {
        AlertRule {
            rule_name: name.to_string(),
            service_name: service.to_string(),
            metric_type,
            threshold_value: threshold,
            comparison_operator: ComparisonOperator::Gt,
            duration_minutes: 0,
            severity,
            enabled: true,
            description: None,
        }
    }

    fn metric(service: &str, metric_type: MetricType, value: f64) -> MetricEvent {
        MetricEvent::new(service, metric_type, value, t("10:00:00"))
    }

    fn t(hms: &str) -> NaiveDateTime {
        wire_time::parse(&format!("2026-03-14T{hms}")).unwrap()
    }

    #[tokio::test]
    async fn test_trigger_then_resolve() {
        let f = fixture(vec![rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High)]);

        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 92.0), t("10:00:00"))
            .await
            .unwrap();
        assert_eq!(report.triggered.len(), 1);

        let cached = f.cache.alert_state_snapshot("web", "CPU_HIGH").unwrap();
        assert_eq!(cached.status, AlertStatus::Active);
        assert_eq!(cached.alert_type, "CPU_HIGH");
        assert_eq!(cached.current_value, 92.0);
        assert_eq!(cached.threshold_value, 80.0);

        // The cached alert equals the published one.
        let published = f.sink.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0], cached);
        assert_eq!(
            published[0].message,
            "CPU usage > threshold exceeded: current=92, threshold=80"
        );

        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 10.0), t("10:00:01"))
            .await
            .unwrap();
        assert_eq!(report.resolved.len(), 1);
        assert!(f.cache.alert_state_snapshot("web", "CPU_HIGH").is_none());

        let published = f.sink.published();
        assert_eq!(published.len(), 2);
        let resolved = &published[1];
        assert_eq!(resolved.alert_id, cached.alert_id);
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.duration_seconds, Some(1));
        assert!(resolved.resolved_at.unwrap() >= resolved.triggered_at);

        // History: one row, resolved in place.
        let rows = f.history.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alert_id, cached.alert_id);
        assert_eq!(rows[0].status, AlertStatus::Resolved);
        assert_eq!(rows[0].duration_seconds, Some(1));
    }

    #[tokio::test]
    async fn test_no_retrigger_while_active() {
        let f = fixture(vec![rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High)]);

        f.engine
            .process_at(&metric("web", MetricType::Cpu, 92.0), t("10:00:00"))
            .await
            .unwrap();
        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 95.0), t("10:00:30"))
            .await
            .unwrap();

        assert!(report.triggered.is_empty());
        assert!(report.resolved.is_empty());
        assert_eq!(f.sink.published().len(), 1);
        assert_eq!(f.history.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_wildcard_and_specific_both_fire() {
        let f = fixture(vec![
            rule("mem-high", "*", MetricType::Memory, 85.0, Severity::High),
            rule("db-mem-critical", "db", MetricType::Memory, 90.0, Severity::Critical),
        ]);

        let report = f
            .engine
            .process_at(&metric("db", MetricType::Memory, 92.0), t("10:00:00"))
            .await
            .unwrap();

        assert_eq!(report.triggered.len(), 2);
        let mut types: Vec<String> = report
            .triggered
            .iter()
            .map(|a| a.alert_type.clone())
            .collect();
        types.sort();
        assert_eq!(types, vec!["MEMORY_CRITICAL", "MEMORY_HIGH"]);
        // Specific rule evaluated first.
        assert_eq!(f.sink.published()[0].alert_type, "MEMORY_CRITICAL");
        assert!(f.cache.alert_state_snapshot("db", "MEMORY_HIGH").is_some());
        assert!(f.cache.alert_state_snapshot("db", "MEMORY_CRITICAL").is_some());
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let f = fixture(vec![rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High)]);
        let m = metric("web", MetricType::Cpu, 92.0);

        let first = f.engine.process_at(&m, t("10:00:00")).await.unwrap();
        let second = f.engine.process_at(&m, t("10:00:00")).await.unwrap();

        assert_eq!(first.triggered.len(), 1);
        assert!(second.triggered.is_empty());
        // Exactly one publish and one history row for the alert id.
        assert_eq!(f.sink.published().len(), 1);
        assert_eq!(f.history.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_duration_gate_holds_trigger_until_window_elapses() {
        let mut r = rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High);
        r.duration_minutes = 5;
        let f = fixture(vec![r]);

        // First violation opens the window, no ACTIVE yet.
        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 92.0), t("10:00:00"))
            .await
            .unwrap();
        assert!(report.triggered.is_empty());
        assert_eq!(report.gated, 1);
        assert!(f.cache.alert_state_snapshot("web", "CPU_HIGH").is_none());

        // Still inside the window.
        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 94.0), t("10:03:00"))
            .await
            .unwrap();
        assert!(report.triggered.is_empty());

        // Window elapsed: fires, pending cleared.
        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 96.0), t("10:05:00"))
            .await
            .unwrap();
        assert_eq!(report.triggered.len(), 1);
        assert_eq!(report.triggered[0].triggered_at, t("10:05:00"));
    }

    #[tokio::test]
    async fn test_duration_gate_clears_on_recovery() {
        let mut r = rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High);
        r.duration_minutes = 5;
        let f = fixture(vec![r]);

        f.engine
            .process_at(&metric("web", MetricType::Cpu, 92.0), t("10:00:00"))
            .await
            .unwrap();
        // Non-violating sample clears the pending mark.
        f.engine
            .process_at(&metric("web", MetricType::Cpu, 40.0), t("10:02:00"))
            .await
            .unwrap();
        // Violation resumes: the window restarts, so no trigger at 10:05.
        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 93.0), t("10:04:00"))
            .await
            .unwrap();
        assert_eq!(report.gated, 1);
        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 93.0), t("10:05:00"))
            .await
            .unwrap();
        assert!(report.triggered.is_empty());
        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 93.0), t("10:09:00"))
            .await
            .unwrap();
        assert_eq!(report.triggered.len(), 1);
    }

    #[tokio::test]
    async fn test_trigger_survives_history_failure() {
        let f = fixture(vec![rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High)]);
        f.history.set_fail_inserts(true);

        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 92.0), t("10:00:00"))
            .await
            .unwrap();

        // Cache is source of truth: trigger still cached and published.
        assert_eq!(report.triggered.len(), 1);
        assert!(f.cache.alert_state_snapshot("web", "CPU_HIGH").is_some());
        assert_eq!(f.sink.published().len(), 1);
        assert!(f.history.rows().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_fails_when_cache_delete_fails() {
        let f = fixture(vec![rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High)]);
        f.engine
            .process_at(&metric("web", MetricType::Cpu, 92.0), t("10:00:00"))
            .await
            .unwrap();

        f.cache.set_fail_state_deletes(true);
        let result = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 10.0), t("10:01:00"))
            .await;

        assert!(result.is_err());
        // No resolved publish went out; the record will be redelivered.
        assert_eq!(f.sink.published().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_fails_when_history_update_fails() {
        let f = fixture(vec![rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High)]);
        f.engine
            .process_at(&metric("web", MetricType::Cpu, 92.0), t("10:00:00"))
            .await
            .unwrap();

        f.history.set_fail_updates(true);
        let result = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 10.0), t("10:01:00"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_publish_failure_propagates() {
        let f = fixture(vec![rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High)]);
        f.sink.set_fail(true);

        let result = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 92.0), t("10:00:00"))
            .await;
        assert!(result.is_err());
        // The ACTIVE entry was cached before the publish attempt, so the
        // redelivery will see ACTIVE and stay quiet.
        assert!(f.cache.alert_state_snapshot("web", "CPU_HIGH").is_some());
    }

    #[tokio::test]
    async fn test_disabled_and_unrelated_rules_ignored() {
        let mut disabled = rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High);
        disabled.enabled = false;
        let f = fixture(vec![
            disabled,
            rule("mem-high", "*", MetricType::Memory, 85.0, Severity::High),
        ]);

        let report = f
            .engine
            .process_at(&metric("web", MetricType::Cpu, 99.0), t("10:00:00"))
            .await
            .unwrap();
        assert!(report.triggered.is_empty());
        assert!(f.sink.published().is_empty());
    }

    #[tokio::test]
    async fn test_at_most_one_active_per_pair() {
        let f = fixture(vec![rule("cpu-high", "*", MetricType::Cpu, 80.0, Severity::High)]);
        for value in [92.0, 95.0, 99.0, 81.0] {
            f.engine
                .process_at(&metric("web", MetricType::Cpu, value), t("10:00:00"))
                .await
                .unwrap();
        }
        let states = f.cache.scan_alert_states(Some("web")).await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(f.sink.published().len(), 1);
    }
}
