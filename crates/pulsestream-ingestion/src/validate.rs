// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Inbound metric validation.
//!
//! The contract the rest of the pipeline relies on: every event published to
//! `metrics.raw` has a normalized service name matching
//! `^[a-z0-9._-]{2,100}$`, a finite non-negative value within the configured
//! ceiling (percentage-family types additionally ≤ 100), a timestamp inside
//! `[now − 24h, now + 1h]`, and a whitelisted environment. Submissions are
//! deserialized loosely so every problem lands in the error list of one 400
//! response instead of a serde failure naming only the first.

use chrono::{Duration, NaiveDateTime, Utc};
use pulsestream::env_vars;
use pulsestream::event::{wire_time, Environment, MetricEvent, MetricType};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use uuid::Uuid;

static SERVICE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // compile-time constant pattern
    Regex::new(r"^[a-z0-9._-]{2,100}$").expect("service name pattern is valid")
});

/// Default ceiling for metric values.
pub const DEFAULT_MAX_METRIC_VALUE: f64 = 1_000_000.0;

/// How far in the past a sample timestamp may lie.
pub const MAX_TIMESTAMP_AGE_HOURS: i64 = 24;

/// How far in the future a sample timestamp may lie (clock skew allowance).
pub const MAX_TIMESTAMP_SKEW_HOURS: i64 = 1;

/// Validation configuration.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Reject metrics with `value > this`.
    pub max_metric_value: f64,
    /// Whitelist for the `environment` field.
    pub allowed_environments: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_metric_value: DEFAULT_MAX_METRIC_VALUE,
            allowed_environments: vec![
                "dev".to_string(),
                "staging".to_string(),
                "production".to_string(),
                "unknown".to_string(),
            ],
        }
    }
}

impl ValidationConfig {
    /// Load configuration from `INGESTION_MAX_METRIC_VALUE` and
    /// `INGESTION_ALLOWED_ENVIRONMENTS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_metric_value: env_vars::env_f64_or_default(
                env_vars::INGESTION_MAX_METRIC_VALUE,
                DEFAULT_MAX_METRIC_VALUE,
            ),
            allowed_environments: env_vars::env_csv_or_default(
                env_vars::INGESTION_ALLOWED_ENVIRONMENTS,
                "dev,staging,production,unknown",
            ),
        }
    }
}

/// A loosely-typed inbound metric submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSubmission {
    pub service_name: Option<String>,
    pub metric_type: Option<String>,
    pub metric_value: Option<f64>,
    pub timestamp: Option<String>,
    pub unit: Option<String>,
    pub hostname: Option<String>,
    pub environment: Option<String>,
    pub version: Option<String>,
    pub tags: Option<HashMap<String, String>>,
}

/// Validate a submission against the ingestion contract.
///
/// On success returns the immutable [`MetricEvent`] (fresh `eventId`,
/// `createdAt` stamped); on failure every violated rule appears in the
/// error list.
pub fn validate(
    submission: &MetricSubmission,
    config: &ValidationConfig,
) -> Result<MetricEvent, Vec<String>> {
    validate_at(submission, config, Utc::now().naive_utc())
}

pub(crate) fn validate_at(
    submission: &MetricSubmission,
    config: &ValidationConfig,
    now: NaiveDateTime,
) -> Result<MetricEvent, Vec<String>> {
    let mut errors = Vec::new();

    let service_name = match submission.service_name.as_deref() {
        None => {
            errors.push("serviceName is required".to_string());
            None
        }
        Some(raw) => {
            let normalized = raw.trim().to_lowercase();
            if SERVICE_NAME_PATTERN.is_match(&normalized) {
                Some(normalized)
            } else {
                errors.push(format!(
                    "serviceName '{raw}' must match ^[a-z0-9._-]{{2,100}}$ after normalization"
                ));
                None
            }
        }
    };

    let metric_type = match submission.metric_type.as_deref() {
        None => {
            errors.push("metricType is required".to_string());
            None
        }
        Some(raw) => match MetricType::from_wire(raw) {
            Some(metric_type) => Some(metric_type),
            None => {
                errors.push(format!("metricType '{raw}' is not a known metric type"));
                None
            }
        },
    };

    let metric_value = match submission.metric_value {
        None => {
            errors.push("metricValue is required".to_string());
            None
        }
        Some(value) if !value.is_finite() => {
            errors.push("metricValue must be finite".to_string());
            None
        }
        Some(value) if value < 0.0 => {
            errors.push("metricValue must not be negative".to_string());
            None
        }
        Some(value) if value > config.max_metric_value => {
            errors.push(format!(
                "metricValue {value} exceeds the maximum {}",
                config.max_metric_value
            ));
            None
        }
        Some(value) => Some(value),
    };

    if let (Some(metric_type), Some(value)) = (metric_type, metric_value) {
        if metric_type.is_percentage() && value > 100.0 {
            errors.push(format!(
                "metricValue {value} exceeds 100 for percentage type {metric_type}"
            ));
        }
    }

    let timestamp = match submission.timestamp.as_deref() {
        None => Some(now),
        Some(raw) => match wire_time::parse(raw) {
            Err(_) => {
                errors.push(format!(
                    "timestamp '{raw}' is not of the form yyyy-MM-dd'T'HH:mm:ss"
                ));
                None
            }
            Ok(ts) => {
                let oldest = now - Duration::hours(MAX_TIMESTAMP_AGE_HOURS);
                let newest = now + Duration::hours(MAX_TIMESTAMP_SKEW_HOURS);
                if ts < oldest || ts > newest {
                    errors.push(format!(
                        "timestamp '{raw}' is outside the accepted window [now-24h, now+1h]"
                    ));
                    None
                } else {
                    Some(ts)
                }
            }
        },
    };

    let environment = match submission.environment.as_deref() {
        None => None,
        Some(raw) => {
            if !config.allowed_environments.iter().any(|e| e == raw) {
                errors.push(format!("environment '{raw}' is not allowed"));
                None
            } else {
                match Environment::from_wire(raw) {
                    Some(environment) => Some(environment),
                    None => {
                        errors.push(format!("environment '{raw}' is not a known environment"));
                        None
                    }
                }
            }
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    // All four unwraps are guarded by the error check above.
    let (Some(service_name), Some(metric_type), Some(metric_value), Some(timestamp)) =
        (service_name, metric_type, metric_value, timestamp)
    else {
        return Err(vec!["validation failed".to_string()]);
    };

    Ok(MetricEvent {
        event_id: Uuid::new_v4(),
        service_name,
        metric_type,
        metric_value,
        timestamp,
        unit: submission.unit.clone(),
        hostname: submission.hostname.clone(),
        environment,
        version: submission.version.clone(),
        tags: submission.tags.clone(),
        created_at: Some(now),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        wire_time::parse("2026-03-14T12:00:00").unwrap()
    }

    fn submission() -> MetricSubmission {
        MetricSubmission {
            service_name: Some("Web".to_string()),
            metric_type: Some("CPU".to_string()),
            metric_value: Some(42.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_submission_is_normalized_and_stamped() {
        let event = validate_at(&submission(), &ValidationConfig::default(), now()).unwrap();
        assert_eq!(event.service_name, "web");
        assert_eq!(event.metric_type, MetricType::Cpu);
        assert_eq!(event.timestamp, now());
        assert_eq!(event.created_at, Some(now()));
    }

    #[test]
    fn test_service_name_trimmed_and_lowercased() {
        let mut s = submission();
        s.service_name = Some("  Payment-API.v2  ".to_string());
        let event = validate_at(&s, &ValidationConfig::default(), now()).unwrap();
        assert_eq!(event.service_name, "payment-api.v2");
    }

    #[test]
    fn test_service_name_shape_rejected() {
        for bad in ["x", "has space", "bad!chars", &"a".repeat(101)] {
            let mut s = submission();
            s.service_name = Some(bad.to_string());
            let errors = validate_at(&s, &ValidationConfig::default(), now()).unwrap_err();
            assert!(errors.iter().any(|e| e.contains("serviceName")), "{bad}");
        }
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let errors =
            validate_at(&MetricSubmission::default(), &ValidationConfig::default(), now())
                .unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_value_bounds() {
        let config = ValidationConfig::default();
        for (value, fragment) in [
            (f64::NAN, "finite"),
            (-1.0, "negative"),
            (2_000_000.0, "maximum"),
        ] {
            let mut s = submission();
            s.metric_value = Some(value);
            let errors = validate_at(&s, &config, now()).unwrap_err();
            assert!(errors.iter().any(|e| e.contains(fragment)));
        }
    }

    #[test]
    fn test_percentage_family_capped_at_100() {
        let mut s = submission();
        s.metric_type = Some("ERROR_RATE".to_string());
        s.metric_value = Some(101.0);
        let errors = validate_at(&s, &ValidationConfig::default(), now()).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("percentage")));

        // Non-percentage types carry no such cap.
        let mut s = submission();
        s.metric_type = Some("LATENCY".to_string());
        s.metric_value = Some(5000.0);
        assert!(validate_at(&s, &ValidationConfig::default(), now()).is_ok());
    }

    #[test]
    fn test_timestamp_window() {
        let mut s = submission();
        s.timestamp = Some("2026-03-13T11:59:00".to_string()); // 24h01m old
        assert!(validate_at(&s, &ValidationConfig::default(), now()).is_err());

        s.timestamp = Some("2026-03-14T13:01:00".to_string()); // 1h01m ahead
        assert!(validate_at(&s, &ValidationConfig::default(), now()).is_err());

        s.timestamp = Some("2026-03-14T11:00:00".to_string());
        assert!(validate_at(&s, &ValidationConfig::default(), now()).is_ok());
    }

    #[test]
    fn test_environment_whitelist() {
        let mut config = ValidationConfig::default();
        config.allowed_environments = vec!["production".to_string()];

        let mut s = submission();
        s.environment = Some("staging".to_string());
        let errors = validate_at(&s, &config, now()).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("not allowed")));

        s.environment = Some("production".to_string());
        let event = validate_at(&s, &config, now()).unwrap();
        assert_eq!(event.environment, Some(Environment::Production));
    }

    #[test]
    fn test_multiple_errors_accumulate() {
        let mut s = submission();
        s.service_name = Some("x".to_string());
        s.metric_value = Some(-5.0);
        s.environment = Some("qa".to_string());
        let errors = validate_at(&s, &ValidationConfig::default(), now()).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
