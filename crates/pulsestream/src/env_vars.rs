// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Centralized environment variable names and typed accessors.
//!
//! Every binary reads configuration through these constants so option names
//! stay consistent across services.

// =============================================================================
// Environment Variable Name Constants
// =============================================================================

/// Kafka bootstrap servers (preferred).
pub const KAFKA_BROKERS: &str = "KAFKA_BROKERS";
/// Kafka bootstrap servers (legacy alternative to `KAFKA_BROKERS`).
pub const KAFKA_BOOTSTRAP_SERVERS: &str = "KAFKA_BOOTSTRAP_SERVERS";
/// Raw-metrics topic name (default: "metrics.raw").
pub const KAFKA_TOPIC_METRICS_RAW: &str = "KAFKA_TOPIC_METRICS_RAW";
/// Alerts topic name (default: "alerts").
pub const KAFKA_TOPIC_ALERTS: &str = "KAFKA_TOPIC_ALERTS";

/// Redis connection URL (default: "redis://localhost:6379").
pub const REDIS_URL: &str = "REDIS_URL";
/// PostgreSQL connection string.
pub const DATABASE_URL: &str = "DATABASE_URL";

/// Default TTL in minutes for latest-value cache keys.
pub const CACHE_TTL_MINUTES: &str = "CACHE_TTL_MINUTES";

/// Reject metrics whose value exceeds this ceiling.
pub const INGESTION_MAX_METRIC_VALUE: &str = "INGESTION_MAX_METRIC_VALUE";
/// Comma-separated whitelist for the `environment` field.
pub const INGESTION_ALLOWED_ENVIRONMENTS: &str = "INGESTION_ALLOWED_ENVIRONMENTS";
/// Per-IP ingress rate limit, requests per minute.
pub const INGESTION_MAX_REQUESTS_PER_MINUTE: &str = "INGESTION_MAX_REQUESTS_PER_MINUTE";
/// Ingestion bind host.
pub const INGESTION_HOST: &str = "INGESTION_HOST";
/// Ingestion bind port.
pub const INGESTION_PORT: &str = "INGESTION_PORT";

/// Interval of latest-value emission and heartbeat, in seconds.
pub const STREAMING_HEARTBEAT_INTERVAL_SECS: &str = "STREAMING_HEARTBEAT_INTERVAL_SECS";
/// Per-subscriber buffer depth.
pub const STREAMING_BUFFER_SIZE: &str = "STREAMING_BUFFER_SIZE";
/// Streaming bind host.
pub const STREAMING_HOST: &str = "STREAMING_HOST";
/// Streaming bind port.
pub const STREAMING_PORT: &str = "STREAMING_PORT";

/// Processor health endpoint port.
pub const PROCESSOR_HEALTH_PORT: &str = "PROCESSOR_HEALTH_PORT";
/// Notifier health endpoint port.
pub const NOTIFIER_HEALTH_PORT: &str = "NOTIFIER_HEALTH_PORT";

/// Enabled notification channels, comma-separated subset of
/// {slack, email, webhook}.
pub const NOTIFY_ENABLED_CHANNELS: &str = "NOTIFY_ENABLED_CHANNELS";
/// Enable/disable the notification throttler.
pub const NOTIFY_THROTTLE_ENABLED: &str = "NOTIFY_THROTTLE_ENABLED";
/// Hourly notification cap per service.
pub const NOTIFY_MAX_PER_HOUR: &str = "NOTIFY_MAX_PER_HOUR";
/// Duplicate-suppression window in minutes.
pub const NOTIFY_DUPLICATE_WINDOW_MINUTES: &str = "NOTIFY_DUPLICATE_WINDOW_MINUTES";
/// Slack webhook URL.
pub const NOTIFY_SLACK_WEBHOOK_URL: &str = "NOTIFY_SLACK_WEBHOOK_URL";
/// Generic webhook URL.
pub const NOTIFY_WEBHOOK_URL: &str = "NOTIFY_WEBHOOK_URL";
/// HTTP mail-gateway endpoint for the email channel.
pub const NOTIFY_EMAIL_API_URL: &str = "NOTIFY_EMAIL_API_URL";
/// Recipient list for the email channel, comma-separated.
pub const NOTIFY_EMAIL_RECIPIENTS: &str = "NOTIFY_EMAIL_RECIPIENTS";
/// Per-call timeout for outbound notification sends, in seconds.
pub const NOTIFY_SEND_TIMEOUT_SECS: &str = "NOTIFY_SEND_TIMEOUT_SECS";

// =============================================================================
// Typed helpers
// =============================================================================

/// Reads an environment variable as a string, returning `None` if unset.
#[must_use]
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Reads an environment variable as a string, returning `default` if unset.
#[must_use]
pub fn env_string_or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Reads the first set env var from `primary` and `fallback`, else `default`.
#[must_use]
pub fn env_string_one_of_or_default(primary: &str, fallback: &str, default: &str) -> String {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .unwrap_or_else(|_| default.to_string())
}

/// Reads an environment variable as a `u16`, returning `default` if unset or invalid.
#[must_use]
pub fn env_u16_or_default(name: &str, default: u16) -> u16 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(default)
}

/// Reads an environment variable as a `u32`, returning `default` if unset or invalid.
#[must_use]
pub fn env_u32_or_default(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

/// Reads an environment variable as a `u64`, returning `default` if unset or invalid.
#[must_use]
pub fn env_u64_or_default(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Reads an environment variable as a `usize`, returning `default` if unset or invalid.
#[must_use]
pub fn env_usize_or_default(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Reads an environment variable as an `f64`, returning `default` if unset or invalid.
#[must_use]
pub fn env_f64_or_default(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

/// Reads a boolean env var: "true"/"1" → true, "false"/"0" → false, else `default`.
#[must_use]
pub fn env_bool_or_default(name: &str, default: bool) -> bool {
    match std::env::var(name).ok().as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

/// Reads a comma-separated env var into trimmed, non-empty entries.
#[must_use]
pub fn env_csv_or_default(name: &str, default: &str) -> Vec<String> {
    env_string_or_default(name, default)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; each test uses a unique name.

    #[test]
    fn test_env_string_or_default() {
        assert_eq!(env_string_or_default("PULSESTREAM_TEST_UNSET_1", "x"), "x");
        std::env::set_var("PULSESTREAM_TEST_SET_1", "y");
        assert_eq!(env_string_or_default("PULSESTREAM_TEST_SET_1", "x"), "y");
    }

    #[test]
    fn test_env_u64_invalid_falls_back() {
        std::env::set_var("PULSESTREAM_TEST_U64", "not-a-number");
        assert_eq!(env_u64_or_default("PULSESTREAM_TEST_U64", 42), 42);
    }

    #[test]
    fn test_env_bool_forms() {
        std::env::set_var("PULSESTREAM_TEST_BOOL", "1");
        assert!(env_bool_or_default("PULSESTREAM_TEST_BOOL", false));
        std::env::set_var("PULSESTREAM_TEST_BOOL", "false");
        assert!(!env_bool_or_default("PULSESTREAM_TEST_BOOL", true));
        assert!(env_bool_or_default("PULSESTREAM_TEST_BOOL_UNSET", true));
    }

    #[test]
    fn test_env_csv_trims_and_drops_empty() {
        std::env::set_var("PULSESTREAM_TEST_CSV", " slack , ,webhook,");
        assert_eq!(
            env_csv_or_default("PULSESTREAM_TEST_CSV", ""),
            vec!["slack".to_string(), "webhook".to_string()]
        );
    }
}
