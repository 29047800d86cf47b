// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Alert rules and the pure threshold evaluator.
//!
//! A rule scopes a threshold condition to a `(serviceName, metricType)`
//! pair; `serviceName` may be the wildcard `*`. Evaluation is a pure
//! function of `(value, threshold, operator)`: no state, no side effects.

use crate::event::{ComparisonOperator, MetricType, Severity};
use chrono::NaiveDateTime;
use tracing::debug;

/// Service-name wildcard matching every service.
pub const WILDCARD_SERVICE: &str = "*";

/// Absolute tolerance for the EQ operator.
pub const EQ_EPSILON: f64 = 1e-3;

/// Operator-defined threshold condition on a `(service, metricType)` scope.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    /// Unique rule name.
    pub rule_name: String,
    /// Explicit service name, or [`WILDCARD_SERVICE`].
    pub service_name: String,
    /// Metric type the rule applies to.
    pub metric_type: MetricType,
    /// Threshold compared against the sample value.
    pub threshold_value: f64,
    /// Comparison operator.
    pub comparison_operator: ComparisonOperator,
    /// Minimum minutes the condition must hold before firing; 0 fires on
    /// the first violating sample.
    pub duration_minutes: u32,
    /// Severity of alerts raised by this rule.
    pub severity: Severity,
    /// Disabled rules never match.
    pub enabled: bool,
    /// Operator-facing description.
    pub description: Option<String>,
}

impl AlertRule {
    /// Derived alert-type label `<METRIC_TYPE>_<SEVERITY>`.
    #[must_use]
    pub fn alert_type(&self) -> String {
        alert_type(self.metric_type, self.severity)
    }

    /// Whether this rule scopes to every service.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.service_name == WILDCARD_SERVICE
    }

    /// The sustain window, if any.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        (self.duration_minutes > 0).then(|| chrono::Duration::minutes(i64::from(self.duration_minutes)))
    }

    /// Evaluate this rule against a sample value.
    #[must_use]
    pub fn matches(&self, value: f64) -> bool {
        evaluate(
            Some(value),
            Some(self.threshold_value),
            Some(self.comparison_operator),
        )
    }

    /// Whether `now` is at or past the sustain window that started at
    /// `first_violation`.
    #[must_use]
    pub fn window_elapsed(&self, first_violation: NaiveDateTime, now: NaiveDateTime) -> bool {
        match self.duration() {
            Some(window) => now.signed_duration_since(first_violation) >= window,
            None => true,
        }
    }
}

/// Derived alert-type label `<METRIC_TYPE>_<SEVERITY>`, uppercased.
#[must_use]
pub fn alert_type(metric_type: MetricType, severity: Severity) -> String {
    format!("{}_{}", metric_type.as_str(), severity.as_str())
}

/// Pure threshold evaluation.
///
/// Returns `false` when any input is missing: a partially-specified rule
/// must never fire. EQ compares with absolute tolerance [`EQ_EPSILON`].
#[must_use]
pub fn evaluate(
    value: Option<f64>,
    threshold: Option<f64>,
    operator: Option<ComparisonOperator>,
) -> bool {
    let (Some(value), Some(threshold), Some(operator)) = (value, threshold, operator) else {
        debug!("threshold evaluation skipped: missing value, threshold or operator");
        return false;
    };
    match operator {
        ComparisonOperator::Gt => value > threshold,
        ComparisonOperator::Gte => value >= threshold,
        ComparisonOperator::Lt => value < threshold,
        ComparisonOperator::Lte => value <= threshold,
        ComparisonOperator::Eq => (value - threshold).abs() < EQ_EPSILON,
    }
}

/// Order rules for evaluation: service-specific strictly before wildcard.
///
/// The relative order within each group is preserved (insertion order), so a
/// stable sort is required.
pub fn order_for_evaluation(rules: &mut [AlertRule]) {
    rules.sort_by_key(AlertRule::is_wildcard);
}
