// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Redis cache client for PulseStream
//!
//! Holds the pipeline's shared mutable state under the `monitoring:` key
//! namespace: latest metric per `(service, metricType)`, current alert per
//! `(service, alertType)`, pending duration-gate marks and aggregate-stats
//! hashes.
//!
//! # Graceful degradation
//!
//! The cache must never take the pipeline down with it. Every read
//! short-circuits to "empty" and every write to "not cached" when Redis is
//! unavailable or a per-call deadline expires; failures are logged at a
//! sampled rate. The single exception is [`CacheClient::delete`]: the
//! resolve path's correctness depends on that delete, so it surfaces errors
//! and the caller withholds acknowledgement.
//!
//! # Example
//!
//! ```rust,no_run
//! use pulsestream_cache::{CacheClient, CacheConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = CacheClient::connect(CacheConfig::from_env()).await?;
//! let latest = cache.get("monitoring:metric:web:CPU").await;
//! println!("latest: {latest:?}");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::NaiveDateTime;
use pulsestream::backend::{AlertStateCache, MetricCache};
use pulsestream::env_vars;
use pulsestream::event::{wire_time, AlertEvent, MetricEvent, MetricType};
use pulsestream::keys;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use pulsestream::backend::ACTIVE_ALERT_TTL;

/// TTL for aggregate-stats hashes.
pub const STATS_TTL: Duration = Duration::from_secs(60 * 60);

/// Default TTL in minutes for latest-value keys.
pub const DEFAULT_METRIC_TTL_MINUTES: u64 = 15;

/// Default per-call deadline. Cache calls fail fast into the degradation
/// path rather than stalling a consumer behind a sick Redis.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// SCAN batch size.
const SCAN_COUNT: usize = 100;

/// Log every Nth degraded operation after the first.
const DEGRADED_LOG_SAMPLE: u64 = 100;

static DEGRADED_OPS: AtomicU64 = AtomicU64::new(0);

fn log_degraded(operation: &str, err: &dyn std::fmt::Display) {
    let n = DEGRADED_OPS.fetch_add(1, Ordering::Relaxed);
    if n % DEGRADED_LOG_SAMPLE == 0 {
        warn!(operation, error = %err, degraded_ops = n + 1, "cache unavailable; degrading");
    }
}

/// Errors surfaced by cache operations that are not allowed to degrade.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Redis command timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::CommandError(err.to_string())
    }
}

impl From<CacheError> for pulsestream::Error {
    fn from(err: CacheError) -> Self {
        pulsestream::Error::Cache(err.to_string())
    }
}

/// Cache client configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL.
    pub url: String,
    /// TTL for latest-value keys (and resolved alert-state writes).
    pub metric_ttl: Duration,
    /// Per-call deadline.
    pub command_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            metric_ttl: Duration::from_secs(DEFAULT_METRIC_TTL_MINUTES * 60),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl CacheConfig {
    /// Load configuration from `REDIS_URL` and `CACHE_TTL_MINUTES`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: env_vars::env_string_or_default(env_vars::REDIS_URL, "redis://localhost:6379"),
            metric_ttl: Duration::from_secs(
                env_vars::env_u64_or_default(
                    env_vars::CACHE_TTL_MINUTES,
                    DEFAULT_METRIC_TTL_MINUTES,
                ) * 60,
            ),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Redis-backed cache client.
#[derive(Clone)]
pub struct CacheClient {
    manager: ConnectionManager,
    config: CacheConfig,
}

impl CacheClient {
    /// Connect to Redis. Connection failure at startup is a real error;
    /// degradation only applies to a cache that was reachable once.
    pub async fn connect(config: CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.clone())
            .map_err(|e| CacheError::ConnectionError(format!("invalid Redis URL: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;
        info!(url = %config.url, "connected to Redis");
        Ok(Self { manager, config })
    }

    /// The configured TTL for latest-value keys.
    #[must_use]
    pub fn metric_ttl(&self) -> Duration {
        self.config.metric_ttl
    }

    async fn with_deadline<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                debug!(operation, error = %err, "redis command failed");
                Err(err.into())
            }
            Err(_) => Err(CacheError::Timeout(self.config.command_timeout)),
        }
    }

    /// Set `key` to `value` with a TTL. Returns whether the value was cached.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut conn = self.manager.clone();
        let result = self
            .with_deadline("set", conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()))
            .await;
        match result {
            Ok(()) => true,
            Err(err) => {
                log_degraded("set", &err);
                false
            }
        }
    }

    /// Get `key`. Returns `None` both for a missing key and a degraded cache.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.manager.clone();
        let result = self
            .with_deadline("get", conn.get::<_, Option<String>>(key))
            .await;
        match result {
            Ok(value) => value,
            Err(err) => {
                log_degraded("get", &err);
                None
            }
        }
    }

    /// Delete `key`. Surfaces failure: callers that depend on the delete
    /// for correctness must not acknowledge their input on error.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        self.with_deadline("delete", conn.del::<_, ()>(key)).await
    }

    /// Delete `key`, degrading silently. For keys whose TTL self-heals.
    pub async fn delete_quiet(&self, key: &str) {
        if let Err(err) = self.delete(key).await {
            log_degraded("delete", &err);
        }
    }

    /// Refresh the TTL of `key`. Returns whether the expiry was applied.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let mut conn = self.manager.clone();
        let result = self
            .with_deadline(
                "expire",
                conn.expire::<_, bool>(key, ttl.as_secs() as i64),
            )
            .await;
        match result {
            Ok(applied) => applied,
            Err(err) => {
                log_degraded("expire", &err);
                false
            }
        }
    }

    /// All keys under `prefix`, via cursor SCAN. Empty on degradation.
    pub async fn scan(&self, prefix: &str) -> Vec<String> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        let pattern = format!("{prefix}*");
        loop {
            let mut conn = self.manager.clone();
            let pattern = pattern.clone();
            let result: Result<(u64, Vec<String>), CacheError> = self
                .with_deadline("scan", async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT)
                        .query_async(&mut conn)
                        .await
                })
                .await;
            match result {
                Ok((next, mut batch)) => {
                    keys.append(&mut batch);
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                Err(err) => {
                    log_degraded("scan", &err);
                    return Vec::new();
                }
            }
        }
        keys
    }

    /// Fetch many keys at once. Missing keys yield `None` entries; a
    /// degraded cache yields an all-`None` result of the same length.
    pub async fn get_many(&self, keys: &[String]) -> Vec<Option<String>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let mut conn = self.manager.clone();
        let keys_owned = keys.to_vec();
        let result = self
            .with_deadline("mget", async move {
                redis::cmd("MGET")
                    .arg(&keys_owned)
                    .query_async::<Vec<Option<String>>>(&mut conn)
                    .await
            })
            .await;
        match result {
            Ok(values) => values,
            Err(err) => {
                log_degraded("mget", &err);
                vec![None; keys.len()]
            }
        }
    }

    /// Write a hash of floats under `key` with a TTL. Returns whether the
    /// hash was written.
    pub async fn hset_all(&self, key: &str, fields: &HashMap<String, f64>, ttl: Duration) -> bool {
        if fields.is_empty() {
            return true;
        }
        let mut conn = self.manager.clone();
        let items: Vec<(String, f64)> = fields.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let key_owned = key.to_string();
        let result = self
            .with_deadline("hset", async move {
                redis::pipe()
                    .hset_multiple(&key_owned, &items)
                    .ignore()
                    .expire(&key_owned, ttl.as_secs() as i64)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await
            })
            .await;
        match result {
            Ok(()) => true,
            Err(err) => {
                log_degraded("hset", &err);
                false
            }
        }
    }

    /// Read a hash of floats. Empty on a missing key or degraded cache.
    pub async fn hgetall(&self, key: &str) -> HashMap<String, f64> {
        let mut conn = self.manager.clone();
        let result = self
            .with_deadline("hgetall", conn.hgetall::<_, HashMap<String, f64>>(key))
            .await;
        match result {
            Ok(fields) => fields,
            Err(err) => {
                log_degraded("hgetall", &err);
                HashMap::new()
            }
        }
    }

    fn decode_metric_value(key: &str, value: &str) -> Option<MetricEvent> {
        match pulsestream::codec::decode_metric(value.as_bytes()) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(key, error = %err, "undecodable cached metric; skipping");
                None
            }
        }
    }

    fn decode_alert_value(key: &str, value: &str) -> Option<AlertEvent> {
        match pulsestream::codec::decode_alert(value.as_bytes()) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(key, error = %err, "undecodable cached alert; skipping");
                None
            }
        }
    }

    async fn scan_values(&self, prefix: &str) -> Vec<(String, String)> {
        let keys = self.scan(prefix).await;
        let values = self.get_many(&keys).await;
        keys.into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect()
    }
}

#[async_trait]
impl MetricCache for CacheClient {
    async fn put_latest_metric(&self, event: &MetricEvent) -> pulsestream::Result<bool> {
        let key = keys::latest_metric(&event.service_name, event.metric_type);
        let payload = pulsestream::codec::encode_metric(event)?;
        let payload = String::from_utf8(payload)
            .map_err(|e| pulsestream::Error::InvalidEvent(e.to_string()))?;
        Ok(self.set(&key, &payload, self.config.metric_ttl).await)
    }

    async fn latest_metric(
        &self,
        service: &str,
        metric_type: MetricType,
    ) -> pulsestream::Result<Option<MetricEvent>> {
        let key = keys::latest_metric(service, metric_type);
        Ok(self
            .get(&key)
            .await
            .and_then(|value| Self::decode_metric_value(&key, &value)))
    }

    async fn scan_latest_metrics(
        &self,
        service: Option<&str>,
    ) -> pulsestream::Result<Vec<MetricEvent>> {
        let prefix = keys::latest_metric_prefix(service);
        Ok(self
            .scan_values(&prefix)
            .await
            .into_iter()
            .filter_map(|(key, value)| Self::decode_metric_value(&key, &value))
            .collect())
    }

    async fn stats(
        &self,
        service: &str,
        metric_type: MetricType,
        window: &str,
    ) -> pulsestream::Result<HashMap<String, f64>> {
        let key = keys::stats(service, metric_type, window);
        Ok(self.hgetall(&key).await)
    }

    async fn put_stats(
        &self,
        service: &str,
        metric_type: MetricType,
        window: &str,
        stats: &HashMap<String, f64>,
    ) -> pulsestream::Result<bool> {
        let key = keys::stats(service, metric_type, window);
        Ok(self.hset_all(&key, stats, STATS_TTL).await)
    }
}

#[async_trait]
impl AlertStateCache for CacheClient {
    async fn alert_state(
        &self,
        service: &str,
        alert_type: &str,
    ) -> pulsestream::Result<Option<AlertEvent>> {
        let key = keys::alert_state(service, alert_type);
        Ok(self
            .get(&key)
            .await
            .and_then(|value| Self::decode_alert_value(&key, &value)))
    }

    async fn put_alert_state(
        &self,
        alert: &AlertEvent,
        ttl: Duration,
    ) -> pulsestream::Result<bool> {
        let key = keys::alert_state(&alert.service_name, &alert.alert_type);
        let payload = pulsestream::codec::encode_alert(alert)?;
        let payload = String::from_utf8(payload)
            .map_err(|e| pulsestream::Error::InvalidEvent(e.to_string()))?;
        Ok(self.set(&key, &payload, ttl).await)
    }

    async fn clear_alert_state(&self, service: &str, alert_type: &str) -> pulsestream::Result<()> {
        let key = keys::alert_state(service, alert_type);
        self.delete(&key).await.map_err(pulsestream::Error::from)
    }

    async fn scan_alert_states(
        &self,
        service: Option<&str>,
    ) -> pulsestream::Result<Vec<AlertEvent>> {
        let prefix = keys::alert_state_prefix(service);
        Ok(self
            .scan_values(&prefix)
            .await
            .into_iter()
            .filter_map(|(key, value)| Self::decode_alert_value(&key, &value))
            .collect())
    }

    async fn pending_since(
        &self,
        service: &str,
        alert_type: &str,
    ) -> pulsestream::Result<Option<NaiveDateTime>> {
        let key = keys::alert_pending(service, alert_type);
        Ok(self.get(&key).await.and_then(|value| {
            wire_time::parse(&value)
                .map_err(|err| {
                    warn!(key, error = %err, "unparseable pending mark; ignoring");
                })
                .ok()
        }))
    }

    async fn put_pending_since(
        &self,
        service: &str,
        alert_type: &str,
        first_violation: NaiveDateTime,
        ttl: Duration,
    ) -> pulsestream::Result<bool> {
        let key = keys::alert_pending(service, alert_type);
        Ok(self.set(&key, &wire_time::format(&first_violation), ttl).await)
    }

    async fn clear_pending(&self, service: &str, alert_type: &str) -> pulsestream::Result<()> {
        // Best-effort: the pending TTL is twice its window, so a missed
        // delete expires on its own.
        self.delete_quiet(&keys::alert_pending(service, alert_type))
            .await;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.metric_ttl, Duration::from_secs(15 * 60));
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn test_active_alert_ttl_is_24h() {
        assert_eq!(ACTIVE_ALERT_TTL, Duration::from_secs(86_400));
    }

    #[test]
    fn test_cache_error_converts_to_core_error() {
        let err = pulsestream::Error::from(CacheError::Timeout(Duration::from_secs(2)));
        assert!(matches!(err, pulsestream::Error::Cache(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
