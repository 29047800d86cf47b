// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # PulseStream Event Model
//!
//! The two event types every service agrees on, plus the closed enums they
//! carry. Wire form is JSON with lowerCamelCase field names; enum values are
//! the exact uppercase constant names; timestamps are local wall-clock
//! `yyyy-MM-dd'T'HH:mm:ss` with no timezone (see [`wire_time`]).
//!
//! ## Message Types
//!
//! - **[`MetricEvent`]**: a single time-stamped measurement emitted by a
//!   monitored service. Created by the ingestion publisher, immutable after.
//! - **[`AlertEvent`]**: a record of a rule violation. Created on trigger,
//!   mutated exactly once on resolution, immutable after.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Closed set of metric types accepted by the pipeline.
///
/// Each type carries a default unit and a human-readable display name used
/// in alert messages. The wire form is the uppercase constant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    Cpu,
    Memory,
    Latency,
    ErrorRate,
    Throughput,
    DiskIo,
    NetworkBandwidth,
    DbConnections,
    QueueDepth,
    CacheHitRate,
    HeapMemory,
    ThreadCount,
    GcTime,
    Custom,
}

impl MetricType {
    /// All metric types, in declaration order.
    pub const ALL: [MetricType; 14] = [
        MetricType::Cpu,
        MetricType::Memory,
        MetricType::Latency,
        MetricType::ErrorRate,
        MetricType::Throughput,
        MetricType::DiskIo,
        MetricType::NetworkBandwidth,
        MetricType::DbConnections,
        MetricType::QueueDepth,
        MetricType::CacheHitRate,
        MetricType::HeapMemory,
        MetricType::ThreadCount,
        MetricType::GcTime,
        MetricType::Custom,
    ];

    /// The exact wire constant name, also used in cache keys and alert types.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricType::Cpu => "CPU",
            MetricType::Memory => "MEMORY",
            MetricType::Latency => "LATENCY",
            MetricType::ErrorRate => "ERROR_RATE",
            MetricType::Throughput => "THROUGHPUT",
            MetricType::DiskIo => "DISK_IO",
            MetricType::NetworkBandwidth => "NETWORK_BANDWIDTH",
            MetricType::DbConnections => "DB_CONNECTIONS",
            MetricType::QueueDepth => "QUEUE_DEPTH",
            MetricType::CacheHitRate => "CACHE_HIT_RATE",
            MetricType::HeapMemory => "HEAP_MEMORY",
            MetricType::ThreadCount => "THREAD_COUNT",
            MetricType::GcTime => "GC_TIME",
            MetricType::Custom => "CUSTOM",
        }
    }

    /// Unit assumed when a metric arrives without one.
    #[must_use]
    pub const fn default_unit(self) -> &'static str {
        match self {
            MetricType::Cpu | MetricType::Memory | MetricType::HeapMemory => "percent",
            MetricType::ErrorRate | MetricType::CacheHitRate => "percent",
            MetricType::Latency | MetricType::GcTime => "ms",
            MetricType::Throughput => "req/s",
            MetricType::DiskIo => "MB/s",
            MetricType::NetworkBandwidth => "Mbps",
            MetricType::DbConnections => "connections",
            MetricType::QueueDepth => "messages",
            MetricType::ThreadCount => "threads",
            MetricType::Custom => "",
        }
    }

    /// Display name used when building alert messages.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            MetricType::Cpu => "CPU usage",
            MetricType::Memory => "Memory usage",
            MetricType::Latency => "Latency",
            MetricType::ErrorRate => "Error rate",
            MetricType::Throughput => "Throughput",
            MetricType::DiskIo => "Disk I/O",
            MetricType::NetworkBandwidth => "Network bandwidth",
            MetricType::DbConnections => "DB connections",
            MetricType::QueueDepth => "Queue depth",
            MetricType::CacheHitRate => "Cache hit rate",
            MetricType::HeapMemory => "Heap memory",
            MetricType::ThreadCount => "Thread count",
            MetricType::GcTime => "GC time",
            MetricType::Custom => "Custom metric",
        }
    }

    /// Whether values of this type are bounded to `[0, 100]`.
    ///
    /// Percentage family: the default unit mentions "percent", or the
    /// constant name mentions "RATE".
    #[must_use]
    pub fn is_percentage(self) -> bool {
        self.default_unit().contains("percent") || self.as_str().contains("RATE")
    }

    /// Parse the exact wire constant name.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        MetricType::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// The exact wire constant name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Parse the exact wire constant name.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    AutoResolved,
    Suppressed,
    Pending,
}

impl AlertStatus {
    /// The exact wire constant name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "ACTIVE",
            AlertStatus::Acknowledged => "ACKNOWLEDGED",
            AlertStatus::Resolved => "RESOLVED",
            AlertStatus::AutoResolved => "AUTO_RESOLVED",
            AlertStatus::Suppressed => "SUPPRESSED",
            AlertStatus::Pending => "PENDING",
        }
    }

    /// Parse the exact wire constant name.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(AlertStatus::Active),
            "ACKNOWLEDGED" => Some(AlertStatus::Acknowledged),
            "RESOLVED" => Some(AlertStatus::Resolved),
            "AUTO_RESOLVED" => Some(AlertStatus::AutoResolved),
            "SUPPRESSED" => Some(AlertStatus::Suppressed),
            "PENDING" => Some(AlertStatus::Pending),
            _ => None,
        }
    }
}

/// Threshold comparison operator for alert rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl ComparisonOperator {
    /// Symbol used in alert messages.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::Eq => "==",
        }
    }

    /// The exact wire constant name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ComparisonOperator::Gt => "GT",
            ComparisonOperator::Gte => "GTE",
            ComparisonOperator::Lt => "LT",
            ComparisonOperator::Lte => "LTE",
            ComparisonOperator::Eq => "EQ",
        }
    }

    /// Parse the exact wire constant name.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "GT" => Some(ComparisonOperator::Gt),
            "GTE" => Some(ComparisonOperator::Gte),
            "LT" => Some(ComparisonOperator::Lt),
            "LTE" => Some(ComparisonOperator::Lte),
            "EQ" => Some(ComparisonOperator::Eq),
            _ => None,
        }
    }
}

/// Deployment environment a metric was sampled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Production,
    Unknown,
}

impl Environment {
    /// The lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Unknown => "unknown",
        }
    }

    /// Parse the lowercase wire name.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "dev" => Some(Environment::Dev),
            "staging" => Some(Environment::Staging),
            "production" => Some(Environment::Production),
            "unknown" => Some(Environment::Unknown),
            _ => None,
        }
    }
}

/// Serde adapter for the wire timestamp format `yyyy-MM-dd'T'HH:mm:ss`.
///
/// Timestamps are the producer's local wall clock as carried in the event:
/// no timezone on the wire, none attached on read. Reads tolerate a
/// fractional-seconds suffix; writes never emit one.
pub mod wire_time {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Wire timestamp format (serialization).
    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
    // `%.f` also matches the empty string, so this accepts both forms.
    const PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

    /// Parse a wire timestamp.
    pub fn parse(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, PARSE_FORMAT)
    }

    /// Format a timestamp for the wire.
    #[must_use]
    pub fn format(dt: &NaiveDateTime) -> String {
        dt.format(FORMAT).to_string()
    }

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// `Option<NaiveDateTime>` variant of the adapter.
    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{self, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => serializer.serialize_str(&super::format(dt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            let s = Option::<String>::deserialize(deserializer)?;
            s.map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// A single time-stamped measurement emitted by a monitored service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEvent {
    /// Unique event identity, assigned at ingestion.
    pub event_id: Uuid,

    /// Normalized (trimmed, lowercase) service name.
    pub service_name: String,

    /// Metric type.
    pub metric_type: MetricType,

    /// Finite, non-negative sample value.
    pub metric_value: f64,

    /// Sample time, producer's local clock.
    #[serde(with = "wire_time")]
    pub timestamp: NaiveDateTime,

    /// Unit override; the metric type's default unit applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Host the sample was taken on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Deployment environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    /// Service version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Free-form labels; omitted from the wire when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,

    /// Ingestion acceptance time.
    #[serde(default, with = "wire_time::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

impl MetricEvent {
    /// Create a metric event with a fresh id and no optional fields.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        metric_type: MetricType,
        metric_value: f64,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            service_name: service_name.into(),
            metric_type,
            metric_value,
            timestamp,
            unit: None,
            hostname: None,
            environment: None,
            version: None,
            tags: None,
            created_at: None,
        }
    }

    /// Effective unit: the explicit one, else the type's default.
    #[must_use]
    pub fn unit(&self) -> &str {
        self.unit
            .as_deref()
            .unwrap_or_else(|| self.metric_type.default_unit())
    }
}

/// A record of a rule violation, ACTIVE until the condition clears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    /// Stable identity across the ACTIVE→RESOLVED transition.
    pub alert_id: Uuid,

    /// Service the alert scopes to.
    pub service_name: String,

    /// Derived label `<METRIC_TYPE>_<SEVERITY>`, uppercased.
    pub alert_type: String,

    /// Severity inherited from the firing rule.
    pub severity: Severity,

    /// Lifecycle state.
    pub status: AlertStatus,

    /// Human-readable summary.
    pub message: String,

    /// Rule description, when the rule carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Threshold the rule compared against.
    pub threshold_value: f64,

    /// Sample value at trigger (updated once at resolve).
    pub current_value: f64,

    /// Trigger time.
    #[serde(with = "wire_time")]
    pub triggered_at: NaiveDateTime,

    /// Resolution time; set exactly once.
    #[serde(default, with = "wire_time::option", skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<NaiveDateTime>,

    /// `floor(resolvedAt − triggeredAt)` in seconds, set with `resolvedAt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,

    /// Host carried over from the triggering metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Environment carried over from the triggering metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,

    /// Free-form metadata; omitted from the wire when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl AlertEvent {
    /// Whether this alert is currently ACTIVE.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Apply the single resolution mutation.
    ///
    /// Sets `status=RESOLVED`, `resolvedAt`, `currentValue`, and
    /// `durationSeconds = floor(resolvedAt − triggeredAt)`. The alert id is
    /// untouched; callers must not resolve twice.
    pub fn resolve(&mut self, resolved_at: NaiveDateTime, current_value: f64) {
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(resolved_at);
        self.current_value = current_value;
        self.duration_seconds = Some(
            resolved_at
                .signed_duration_since(self.triggered_at)
                .num_seconds(),
        );
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_metric_type_wire_names() {
        assert_eq!(MetricType::ErrorRate.as_str(), "ERROR_RATE");
        assert_eq!(MetricType::from_wire("DISK_IO"), Some(MetricType::DiskIo));
        assert_eq!(MetricType::from_wire("nope"), None);
        for t in MetricType::ALL {
            assert_eq!(MetricType::from_wire(t.as_str()), Some(t));
        }
    }

    #[test]
    fn test_percentage_family() {
        assert!(MetricType::Cpu.is_percentage());
        assert!(MetricType::ErrorRate.is_percentage());
        assert!(MetricType::CacheHitRate.is_percentage());
        assert!(MetricType::HeapMemory.is_percentage());
        assert!(!MetricType::Latency.is_percentage());
        assert!(!MetricType::QueueDepth.is_percentage());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_wire_time_round_trip() {
        let dt = ts(9, 30, 5);
        let formatted = wire_time::format(&dt);
        assert_eq!(formatted, "2026-03-14T09:30:05");
        assert_eq!(wire_time::parse(&formatted).unwrap(), dt);
    }

    #[test]
    fn test_wire_time_tolerates_fractional_seconds() {
        let dt = wire_time::parse("2026-03-14T09:30:05.123").unwrap();
        assert_eq!(wire_time::format(&dt), "2026-03-14T09:30:05");
    }

    #[test]
    fn test_default_unit_applies() {
        let mut event = MetricEvent::new("web", MetricType::Latency, 120.0, ts(10, 0, 0));
        assert_eq!(event.unit(), "ms");
        event.unit = Some("us".to_string());
        assert_eq!(event.unit(), "us");
    }

    #[test]
    fn test_resolve_sets_floor_duration() {
        let mut alert = AlertEvent {
            alert_id: Uuid::new_v4(),
            service_name: "web".to_string(),
            alert_type: "CPU_HIGH".to_string(),
            severity: Severity::High,
            status: AlertStatus::Active,
            message: "CPU usage > threshold exceeded: current=92, threshold=80".to_string(),
            description: None,
            threshold_value: 80.0,
            current_value: 92.0,
            triggered_at: ts(10, 0, 0),
            resolved_at: None,
            duration_seconds: None,
            hostname: None,
            environment: None,
            metadata: None,
        };
        let id = alert.alert_id;
        alert.resolve(ts(10, 1, 30), 10.0);
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.alert_id, id);
        assert_eq!(alert.duration_seconds, Some(90));
        assert_eq!(alert.current_value, 10.0);
        assert!(alert.resolved_at.unwrap() >= alert.triggered_at);
    }
}
