// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Notification Throttler
//!
//! Two independent checks, in order, before an alert reaches any outbound
//! channel:
//!
//! 1. **Duplicate window**: the same `(service, alertType)` accepted within
//!    `duplicateSuppressionMinutes` is suppressed.
//! 2. **Hourly rate limit**: a service that already used its hourly budget
//!    is suppressed for the rest of the hour.
//!
//! Acceptance records into both maps; a sweep on every record drops
//! duplicate entries older than two hours and hour buckets other than the
//! current one. The throttler is process-local by design; notification
//! volume tolerates per-replica budgets, unlike alert state.

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use dashmap::DashMap;
use pulsestream::env_vars;
use pulsestream::event::AlertEvent;
use pulsestream::metrics_utils::{int_counter, METRIC_NOTIFICATIONS_SUPPRESSED_TOTAL};
use prometheus::IntCounter;
use std::sync::LazyLock;
use tracing::debug;

static SUPPRESSED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    int_counter(
        METRIC_NOTIFICATIONS_SUPPRESSED_TOTAL,
        "Notifications suppressed by the throttler",
    )
});

/// Default hourly budget per service.
pub const DEFAULT_MAX_PER_HOUR: u32 = 10;

/// Default duplicate-suppression window in minutes.
pub const DEFAULT_DUPLICATE_WINDOW_MINUTES: u32 = 5;

/// Age beyond which duplicate entries are swept.
const DUPLICATE_SWEEP_HOURS: i64 = 2;

/// Throttler configuration.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Disable all suppression when false.
    pub enabled: bool,
    /// Hourly notification cap per service.
    pub max_per_hour: u32,
    /// Duplicate-suppression window.
    pub duplicate_window: ChronoDuration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_hour: DEFAULT_MAX_PER_HOUR,
            duplicate_window: ChronoDuration::minutes(i64::from(DEFAULT_DUPLICATE_WINDOW_MINUTES)),
        }
    }
}

impl ThrottleConfig {
    /// Load configuration from `NOTIFY_THROTTLE_ENABLED`,
    /// `NOTIFY_MAX_PER_HOUR` and `NOTIFY_DUPLICATE_WINDOW_MINUTES`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            enabled: env_vars::env_bool_or_default(env_vars::NOTIFY_THROTTLE_ENABLED, true),
            max_per_hour: env_vars::env_u32_or_default(
                env_vars::NOTIFY_MAX_PER_HOUR,
                DEFAULT_MAX_PER_HOUR,
            ),
            duplicate_window: ChronoDuration::minutes(i64::from(env_vars::env_u32_or_default(
                env_vars::NOTIFY_DUPLICATE_WINDOW_MINUTES,
                DEFAULT_DUPLICATE_WINDOW_MINUTES,
            ))),
        }
    }
}

/// Why an alert was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Same `(service, alertType)` accepted within the window.
    Duplicate,
    /// Hourly budget for the service is spent.
    RateLimited,
}

/// Throttle decision for one alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Dispatch to the enabled channels.
    Deliver,
    /// Drop without dispatching.
    Suppress(SuppressReason),
}

/// Process-local sliding duplicate window plus hourly rate limit.
pub struct Throttler {
    config: ThrottleConfig,
    /// `service:alertType` → last accepted time.
    duplicates: DashMap<String, NaiveDateTime>,
    /// `service:yyyy-MM-ddTHH` → accepted count.
    hourly: DashMap<String, u32>,
}

impl Throttler {
    /// Throttler with the given configuration.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            duplicates: DashMap::new(),
            hourly: DashMap::new(),
        }
    }

    /// Decide whether `alert` may be dispatched, recording it if so.
    pub fn check(&self, alert: &AlertEvent) -> Decision {
        self.check_at(alert, Utc::now().naive_utc())
    }

    pub(crate) fn check_at(&self, alert: &AlertEvent, now: NaiveDateTime) -> Decision {
        if !self.config.enabled {
            return Decision::Deliver;
        }
        self.sweep(now);

        let duplicate_key = format!("{}:{}", alert.service_name, alert.alert_type);
        if let Some(last_accepted) = self.duplicates.get(&duplicate_key) {
            if now.signed_duration_since(*last_accepted) < self.config.duplicate_window {
                SUPPRESSED_TOTAL.inc();
                debug!(key = %duplicate_key, "duplicate notification suppressed");
                return Decision::Suppress(SuppressReason::Duplicate);
            }
        }

        let hour_key = hour_key(&alert.service_name, now);
        {
            let count = self.hourly.get(&hour_key).map_or(0, |c| *c);
            if count >= self.config.max_per_hour {
                SUPPRESSED_TOTAL.inc();
                debug!(key = %hour_key, limit = self.config.max_per_hour, "hourly budget spent");
                return Decision::Suppress(SuppressReason::RateLimited);
            }
        }

        // Not suppressed: record under both keys.
        self.duplicates.insert(duplicate_key, now);
        *self.hourly.entry(hour_key).or_insert(0) += 1;
        Decision::Deliver
    }

    /// Drop duplicate entries older than two hours and hour buckets other
    /// than the current one.
    fn sweep(&self, now: NaiveDateTime) {
        let horizon = now - ChronoDuration::hours(DUPLICATE_SWEEP_HOURS);
        self.duplicates.retain(|_, last| *last >= horizon);
        let current_hour = now.format("%Y-%m-%dT%H").to_string();
        self.hourly.retain(|key, _| key.ends_with(&current_hour));
    }
}

fn hour_key(service: &str, now: NaiveDateTime) -> String {
    format!("{service}:{}", now.format("%Y-%m-%dT%H"))
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use pulsestream::event::{wire_time, AlertStatus, Severity};
    use uuid::Uuid;

    fn alert(service: &str, alert_type: &str) -> AlertEvent {
        AlertEvent {
            alert_id: Uuid::new_v4(),
            service_name: service.to_string(),
            alert_type: alert_type.to_string(),
            severity: Severity::High,
            status: AlertStatus::Active,
            message: "CPU usage > threshold exceeded: current=92, threshold=80".to_string(),
            description: None,
            threshold_value: 80.0,
            current_value: 92.0,
            triggered_at: wire_time::parse("2026-03-14T10:00:00").unwrap(),
            resolved_at: None,
            duration_seconds: None,
            hostname: None,
            environment: None,
            metadata: None,
        }
    }

    fn t(hms: &str) -> NaiveDateTime {
        wire_time::parse(&format!("2026-03-14T{hms}")).unwrap()
    }

    fn throttler(max_per_hour: u32) -> Throttler {
        Throttler::new(ThrottleConfig {
            enabled: true,
            max_per_hour,
            duplicate_window: ChronoDuration::minutes(5),
        })
    }

    #[test]
    fn test_hourly_budget() {
        let throttler = throttler(3);
        // Four distinct alert types for one service within one hour.
        for (i, alert_type) in ["CPU_HIGH", "MEMORY_HIGH", "LATENCY_MEDIUM"].iter().enumerate() {
            let decision = throttler.check_at(&alert("web", alert_type), t(&format!("10:0{i}:00")));
            assert_eq!(decision, Decision::Deliver, "{alert_type}");
        }
        let decision = throttler.check_at(&alert("web", "ERROR_RATE_CRITICAL"), t("10:30:00"));
        assert_eq!(decision, Decision::Suppress(SuppressReason::RateLimited));

        // Another service is untouched.
        assert_eq!(
            throttler.check_at(&alert("db", "CPU_HIGH"), t("10:31:00")),
            Decision::Deliver
        );
    }

    #[test]
    fn test_duplicate_window() {
        let throttler = throttler(10);
        assert_eq!(
            throttler.check_at(&alert("web", "CPU_HIGH"), t("10:00:00")),
            Decision::Deliver
        );
        // Within the 5-minute window.
        assert_eq!(
            throttler.check_at(&alert("web", "CPU_HIGH"), t("10:04:00")),
            Decision::Suppress(SuppressReason::Duplicate)
        );
        // Past the window.
        assert_eq!(
            throttler.check_at(&alert("web", "CPU_HIGH"), t("10:05:00")),
            Decision::Deliver
        );
        // A different alert type never collides.
        assert_eq!(
            throttler.check_at(&alert("web", "MEMORY_HIGH"), t("10:04:30")),
            Decision::Deliver
        );
    }

    #[test]
    fn test_budget_resets_next_hour() {
        let throttler = throttler(1);
        assert_eq!(
            throttler.check_at(&alert("web", "CPU_HIGH"), t("10:00:00")),
            Decision::Deliver
        );
        assert_eq!(
            throttler.check_at(&alert("web", "MEMORY_HIGH"), t("10:30:00")),
            Decision::Suppress(SuppressReason::RateLimited)
        );
        // New hour, new budget; the CPU_HIGH duplicate window (5m) has
        // long lapsed too.
        assert_eq!(
            throttler.check_at(&alert("web", "MEMORY_HIGH"), t("11:00:01")),
            Decision::Deliver
        );
    }

    #[test]
    fn test_suppressed_alert_does_not_refresh_window() {
        let throttler = throttler(10);
        throttler.check_at(&alert("web", "CPU_HIGH"), t("10:00:00"));
        throttler.check_at(&alert("web", "CPU_HIGH"), t("10:04:00"));
        // Window measured from the accept at 10:00, not the suppressed
        // attempt at 10:04.
        assert_eq!(
            throttler.check_at(&alert("web", "CPU_HIGH"), t("10:05:30")),
            Decision::Deliver
        );
    }

    #[test]
    fn test_disabled_throttler_delivers_everything() {
        let throttler = Throttler::new(ThrottleConfig {
            enabled: false,
            max_per_hour: 1,
            duplicate_window: ChronoDuration::minutes(5),
        });
        for _ in 0..5 {
            assert_eq!(
                throttler.check_at(&alert("web", "CPU_HIGH"), t("10:00:00")),
                Decision::Deliver
            );
        }
    }

    #[test]
    fn test_sweep_drops_stale_entries() {
        let throttler = throttler(10);
        throttler.check_at(&alert("web", "CPU_HIGH"), t("08:00:00"));
        assert_eq!(throttler.duplicates.len(), 1);
        assert_eq!(throttler.hourly.len(), 1);
        // Three hours later both maps are swept clean by the next check.
        throttler.check_at(&alert("db", "CPU_HIGH"), t("11:00:00"));
        assert_eq!(throttler.duplicates.len(), 1);
        assert_eq!(throttler.hourly.len(), 1);
    }
}
