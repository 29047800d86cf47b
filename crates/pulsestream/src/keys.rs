// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Cache key namespace.
//!
//! Every key the pipeline writes is prefixed `monitoring:`. Builders here
//! are the single source of key shapes so services cannot drift:
//!
//! - `monitoring:metric:<service>:<METRIC_TYPE>` - latest metric JSON
//! - `monitoring:alert:state:<service>:<ALERT_TYPE>` - current alert JSON
//! - `monitoring:alert:pending:<service>:<ALERT_TYPE>` - first-violation mark
//! - `monitoring:stats:<service>:<METRIC_TYPE>:<window>` - aggregate hash

use crate::event::MetricType;

/// Root prefix shared by every pipeline key.
pub const NAMESPACE: &str = "monitoring";

/// Latest-value key for a `(service, metricType)` pair.
#[must_use]
pub fn latest_metric(service: &str, metric_type: MetricType) -> String {
    format!("{NAMESPACE}:metric:{service}:{}", metric_type.as_str())
}

/// Scan prefix for latest-value keys, optionally scoped to one service.
#[must_use]
pub fn latest_metric_prefix(service: Option<&str>) -> String {
    match service {
        Some(service) => format!("{NAMESPACE}:metric:{service}:"),
        None => format!("{NAMESPACE}:metric:"),
    }
}

/// Alert-state key for a `(service, alertType)` pair.
#[must_use]
pub fn alert_state(service: &str, alert_type: &str) -> String {
    format!("{NAMESPACE}:alert:state:{service}:{alert_type}")
}

/// Scan prefix for alert-state keys, optionally scoped to one service.
#[must_use]
pub fn alert_state_prefix(service: Option<&str>) -> String {
    match service {
        Some(service) => format!("{NAMESPACE}:alert:state:{service}:"),
        None => format!("{NAMESPACE}:alert:state:"),
    }
}

/// Pending first-violation key for the duration gate.
#[must_use]
pub fn alert_pending(service: &str, alert_type: &str) -> String {
    format!("{NAMESPACE}:alert:pending:{service}:{alert_type}")
}

/// Aggregate-stats hash key for a `(service, metricType, window)` triple.
#[must_use]
pub fn stats(service: &str, metric_type: MetricType, window: &str) -> String {
    format!(
        "{NAMESPACE}:stats:{service}:{}:{window}",
        metric_type.as_str()
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(
            latest_metric("web", MetricType::Cpu),
            "monitoring:metric:web:CPU"
        );
        assert_eq!(
            alert_state("web", "CPU_HIGH"),
            "monitoring:alert:state:web:CPU_HIGH"
        );
        assert_eq!(
            alert_pending("db", "MEMORY_CRITICAL"),
            "monitoring:alert:pending:db:MEMORY_CRITICAL"
        );
        assert_eq!(
            stats("web", MetricType::ErrorRate, "1m"),
            "monitoring:stats:web:ERROR_RATE:1m"
        );
    }

    #[test]
    fn test_scan_prefixes() {
        assert_eq!(latest_metric_prefix(None), "monitoring:metric:");
        assert_eq!(latest_metric_prefix(Some("web")), "monitoring:metric:web:");
        assert!(latest_metric("web", MetricType::Cpu).starts_with(&latest_metric_prefix(Some("web"))));
        assert_eq!(alert_state_prefix(None), "monitoring:alert:state:");
    }
}
