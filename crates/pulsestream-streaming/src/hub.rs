// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Stream Hub
//!
//! One shared hot stream per topic, multicast to any number of SSE
//! subscribers. The upstream side is a Kafka consumer with
//! `offset-reset=latest` pumping decoded events into a broadcast channel;
//! the downstream side gives every subscriber its own bounded queue with an
//! overflow policy, so one slow dashboard can never stall the shared stream
//! or another subscriber.
//!
//! Policies:
//!
//! - [`OverflowPolicy::DropOldest`]: raw metric/alert streams: a full queue
//!   evicts the oldest undelivered item.
//! - [`OverflowPolicy::KeepLatest`]: the periodic latest-value stream: only
//!   the newest snapshot is worth delivering.
//! - [`OverflowPolicy::CoalesceByKey`]: the combined metrics stream
//!   (capacity `bufferSize × 2`): an undelivered sample for the same
//!   `(service, metricType)` is replaced by the newer one.
//!
//! Filters are pushed down to the subscriber, never to the consumer group:
//! the shared stream stays single regardless of how many filtered views
//! exist.

use pulsestream::codec;
use pulsestream::env_vars;
use pulsestream::event::{AlertEvent, MetricEvent, Severity};
use pulsestream::metrics_utils::{
    int_counter, METRIC_HUB_DECODE_DROPS_TOTAL, METRIC_HUB_QUEUE_EVICTIONS_TOTAL,
};
use parking_lot::Mutex;
use prometheus::IntCounter;
use rdkafka::consumer::StreamConsumer;
use rdkafka::message::Message;
use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static DECODE_DROPS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    int_counter(
        METRIC_HUB_DECODE_DROPS_TOTAL,
        "Records dropped by the stream hub because they failed to decode",
    )
});
static QUEUE_EVICTIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    int_counter(
        METRIC_HUB_QUEUE_EVICTIONS_TOTAL,
        "Items evicted from subscriber queues by backpressure policy",
    )
});

/// Capacity of the shared upstream broadcast channels. Large enough that the
/// per-subscriber queues, not the shared channel, are where backpressure
/// bites.
const UPSTREAM_CAPACITY: usize = 1024;

/// Default per-subscriber buffer depth.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Default latest-value emission / heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Per-subscriber buffer depth.
    pub buffer_size: usize,
    /// Interval of latest-value emission and heartbeat.
    pub heartbeat_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
        }
    }
}

impl HubConfig {
    /// Load configuration from `STREAMING_BUFFER_SIZE` and
    /// `STREAMING_HEARTBEAT_INTERVAL_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            buffer_size: env_vars::env_usize_or_default(
                env_vars::STREAMING_BUFFER_SIZE,
                DEFAULT_BUFFER_SIZE,
            ),
            heartbeat_interval: Duration::from_secs(env_vars::env_u64_or_default(
                env_vars::STREAMING_HEARTBEAT_INTERVAL_SECS,
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
            )),
        }
    }
}

/// Behavior of a full subscriber queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest undelivered item.
    DropOldest,
    /// Keep only the newest item.
    KeepLatest,
    /// Replace an undelivered item carrying the same key; evict oldest when
    /// full without a key match.
    CoalesceByKey,
}

struct QueueState<T> {
    items: VecDeque<(Option<String>, T)>,
    closed: bool,
}

/// Bounded per-subscriber queue applying an overflow policy.
pub struct PolicyQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> PolicyQueue<T> {
    /// New queue with the given capacity (min 1) and policy.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Enqueue an item, applying the overflow policy.
    pub fn push(&self, key: Option<String>, item: T) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        match self.policy {
            OverflowPolicy::KeepLatest => {
                if !state.items.is_empty() {
                    QUEUE_EVICTIONS_TOTAL.inc_by(state.items.len() as u64);
                    state.items.clear();
                }
                state.items.push_back((key, item));
            }
            OverflowPolicy::CoalesceByKey => {
                if let Some(pos) = key.as_ref().and_then(|k| {
                    state
                        .items
                        .iter()
                        .position(|(existing, _)| existing.as_deref() == Some(k.as_str()))
                }) {
                    state.items[pos] = (key, item);
                } else {
                    if state.items.len() >= self.capacity {
                        state.items.pop_front();
                        QUEUE_EVICTIONS_TOTAL.inc();
                    }
                    state.items.push_back((key, item));
                }
            }
            OverflowPolicy::DropOldest => {
                if state.items.len() >= self.capacity {
                    state.items.pop_front();
                    QUEUE_EVICTIONS_TOTAL.inc();
                }
                state.items.push_back((key, item));
            }
        }
        drop(state);
        self.notify.notify_one();
    }

    /// Mark the queue closed; pending items remain poppable.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    /// Dequeue the next item, waiting if empty; `None` once closed and
    /// drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some((_, item)) = state.items.pop_front() {
                    // Wake any further pending pops for remaining items.
                    if !state.items.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

/// A live subscription: the subscriber-local queue plus its forwarder task.
/// Dropping the subscription aborts the forwarder and releases the queue
/// synchronously.
pub struct Subscription<T> {
    queue: Arc<PolicyQueue<T>>,
    forwarder: JoinHandle<()>,
}

impl<T> Subscription<T> {
    pub(crate) fn from_parts(queue: Arc<PolicyQueue<T>>, forwarder: JoinHandle<()>) -> Self {
        Self { queue, forwarder }
    }

    /// Next item, or `None` when the shared stream closed.
    pub async fn recv(&self) -> Option<T> {
        self.queue.pop().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

fn spawn_forwarder<T, F, K>(
    mut rx: broadcast::Receiver<T>,
    queue: Arc<PolicyQueue<T>>,
    filter: F,
    key_fn: K,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(&T) -> bool + Send + 'static,
    K: Fn(&T) -> Option<String> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(item) => {
                    if filter(&item) {
                        queue.push(key_fn(&item), item);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The shared channel already evicted what we missed.
                    QUEUE_EVICTIONS_TOTAL.inc_by(skipped);
                    debug!(skipped, "subscriber lagged behind shared stream");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    queue.close();
                    break;
                }
            }
        }
    })
}

/// Shared fan-out of raw metrics and alerts to SSE subscribers.
pub struct StreamHub {
    metrics_tx: broadcast::Sender<MetricEvent>,
    alerts_tx: broadcast::Sender<AlertEvent>,
    config: HubConfig,
}

impl StreamHub {
    /// Create the hub with its two shared upstream channels.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let (metrics_tx, _) = broadcast::channel(UPSTREAM_CAPACITY);
        let (alerts_tx, _) = broadcast::channel(UPSTREAM_CAPACITY);
        Self {
            metrics_tx,
            alerts_tx,
            config,
        }
    }

    /// The hub configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Sender side of the shared metric stream (used by the pump and tests).
    #[must_use]
    pub fn metrics_sender(&self) -> broadcast::Sender<MetricEvent> {
        self.metrics_tx.clone()
    }

    /// Sender side of the shared alert stream (used by the pump and tests).
    #[must_use]
    pub fn alerts_sender(&self) -> broadcast::Sender<AlertEvent> {
        self.alerts_tx.clone()
    }

    /// Combined metrics stream: every service interleaved, coalesced by
    /// `(service, metricType)`, buffer `bufferSize × 2`.
    #[must_use]
    pub fn subscribe_metrics_combined(&self) -> Subscription<MetricEvent> {
        let queue = Arc::new(PolicyQueue::new(
            self.config.buffer_size * 2,
            OverflowPolicy::CoalesceByKey,
        ));
        let forwarder = spawn_forwarder(
            self.metrics_tx.subscribe(),
            Arc::clone(&queue),
            |_| true,
            |event: &MetricEvent| {
                Some(format!("{}:{}", event.service_name, event.metric_type))
            },
        );
        Subscription { queue, forwarder }
    }

    /// Raw metric stream filtered to one service, buffer `bufferSize`,
    /// drop-oldest.
    #[must_use]
    pub fn subscribe_metrics_for_service(&self, service: String) -> Subscription<MetricEvent> {
        let queue = Arc::new(PolicyQueue::new(
            self.config.buffer_size,
            OverflowPolicy::DropOldest,
        ));
        let forwarder = spawn_forwarder(
            self.metrics_tx.subscribe(),
            Arc::clone(&queue),
            move |event: &MetricEvent| event.service_name == service,
            |_| None,
        );
        Subscription { queue, forwarder }
    }

    /// Alert stream, optionally filtered to one service.
    #[must_use]
    pub fn subscribe_alerts(&self, service: Option<String>) -> Subscription<AlertEvent> {
        let queue = Arc::new(PolicyQueue::new(
            self.config.buffer_size,
            OverflowPolicy::DropOldest,
        ));
        let forwarder = spawn_forwarder(
            self.alerts_tx.subscribe(),
            Arc::clone(&queue),
            move |alert: &AlertEvent| {
                service.as_deref().map_or(true, |s| s == alert.service_name)
            },
            |_| None,
        );
        Subscription { queue, forwarder }
    }

    /// Critical-severity alert stream.
    #[must_use]
    pub fn subscribe_critical_alerts(&self) -> Subscription<AlertEvent> {
        let queue = Arc::new(PolicyQueue::new(
            self.config.buffer_size,
            OverflowPolicy::DropOldest,
        ));
        let forwarder = spawn_forwarder(
            self.alerts_tx.subscribe(),
            Arc::clone(&queue),
            |alert: &AlertEvent| alert.severity == Severity::Critical,
            |_| None,
        );
        Subscription { queue, forwarder }
    }
}

/// Pump the raw-metrics topic into the shared metric channel.
///
/// Decode failures drop the record with a log and the offset advances;
/// consumer errors are retried forever; the shared stream never
/// terminates while the process lives.
pub async fn run_metric_pump(
    consumer: StreamConsumer,
    tx: broadcast::Sender<MetricEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("metric pump started");
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            result = consumer.recv() => match result {
                Ok(msg) => {
                    let Some(payload) = msg.payload() else { continue };
                    match codec::decode_metric(payload) {
                        Ok(event) => {
                            // No receivers is fine; dashboards come and go.
                            let _ = tx.send(event);
                        }
                        Err(e) => {
                            DECODE_DROPS_TOTAL.inc();
                            warn!(offset = msg.offset(), error = %e, "undecodable metric record dropped");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "metric pump consumer error; retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
    info!("metric pump stopped");
}

/// Pump the alerts topic into the shared alert channel.
pub async fn run_alert_pump(
    consumer: StreamConsumer,
    tx: broadcast::Sender<AlertEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("alert pump started");
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            result = consumer.recv() => match result {
                Ok(msg) => {
                    let Some(payload) = msg.payload() else { continue };
                    match codec::decode_alert(payload) {
                        Ok(event) => {
                            let _ = tx.send(event);
                        }
                        Err(e) => {
                            DECODE_DROPS_TOTAL.inc();
                            warn!(offset = msg.offset(), error = %e, "undecodable alert record dropped");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "alert pump consumer error; retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
    info!("alert pump stopped");
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;
    use pulsestream::event::{wire_time, AlertStatus, MetricType};
    use uuid::Uuid;

    fn metric(service: &str, metric_type: MetricType, value: f64) -> MetricEvent {
        MetricEvent::new(
            service,
            metric_type,
            value,
            wire_time::parse("2026-03-14T10:00:00").unwrap(),
        )
    }

    fn alert(service: &str, severity: Severity) -> AlertEvent {
        AlertEvent {
            alert_id: Uuid::new_v4(),
            service_name: service.to_string(),
            alert_type: "CPU_HIGH".to_string(),
            severity,
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

    fn small_hub() -> StreamHub {
        StreamHub::new(HubConfig {
            buffer_size: 2,
            heartbeat_interval: Duration::from_secs(10),
        })
    }

    #[tokio::test]
    async fn test_drop_oldest_policy() {
        let queue: PolicyQueue<u32> = PolicyQueue::new(2, OverflowPolicy::DropOldest);
        queue.push(None, 1);
        queue.push(None, 2);
        queue.push(None, 3);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, Some(3));
    }

    #[tokio::test]
    async fn test_keep_latest_policy() {
        let queue: PolicyQueue<u32> = PolicyQueue::new(5, OverflowPolicy::KeepLatest);
        queue.push(None, 1);
        queue.push(None, 2);
        queue.push(None, 3);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().await, Some(3));
    }

    #[tokio::test]
    async fn test_coalesce_replaces_same_key() {
        let queue: PolicyQueue<u32> = PolicyQueue::new(4, OverflowPolicy::CoalesceByKey);
        queue.push(Some("web:CPU".to_string()), 1);
        queue.push(Some("db:CPU".to_string()), 2);
        queue.push(Some("web:CPU".to_string()), 9);
        assert_eq!(queue.len(), 2);
        // Order preserved, value replaced in place.
        assert_eq!(queue.pop().await, Some(9));
        assert_eq!(queue.pop().await, Some(2));
    }

    #[tokio::test]
    async fn test_pop_returns_none_after_close() {
        let queue: PolicyQueue<u32> = PolicyQueue::new(2, OverflowPolicy::DropOldest);
        queue.push(None, 7);
        queue.close();
        assert_eq!(queue.pop().await, Some(7));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_service_filter_pushdown() {
        let hub = small_hub();
        let all_a = hub.subscribe_metrics_combined();
        let all_b = hub.subscribe_metrics_combined();
        let web_only = hub.subscribe_metrics_for_service("web".to_string());

        hub.metrics_sender()
            .send(metric("db", MetricType::Cpu, 50.0))
            .unwrap();

        // Both unfiltered subscribers see the db metric.
        assert_eq!(all_a.recv().await.unwrap().service_name, "db");
        assert_eq!(all_b.recv().await.unwrap().service_name, "db");

        // The filtered subscriber only sees web.
        hub.metrics_sender()
            .send(metric("web", MetricType::Cpu, 60.0))
            .unwrap();
        assert_eq!(web_only.recv().await.unwrap().service_name, "web");
        assert_eq!(web_only.queue.len(), 0);
    }

    #[tokio::test]
    async fn test_combined_stream_coalesces_by_service_and_type() {
        let hub = small_hub();
        let sub = hub.subscribe_metrics_combined();
        let tx = hub.metrics_sender();

        tx.send(metric("web", MetricType::Cpu, 1.0)).unwrap();
        tx.send(metric("web", MetricType::Cpu, 2.0)).unwrap();
        tx.send(metric("web", MetricType::Memory, 3.0)).unwrap();
        // Give the forwarder a chance to drain the broadcast channel.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first.metric_type, MetricType::Cpu);
        assert_eq!(first.metric_value, 2.0);
        assert_eq!(second.metric_type, MetricType::Memory);
    }

    #[tokio::test]
    async fn test_critical_filter() {
        let hub = small_hub();
        let critical = hub.subscribe_critical_alerts();
        let tx = hub.alerts_sender();

        tx.send(alert("web", Severity::High)).unwrap();
        tx.send(alert("web", Severity::Critical)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let received = critical.recv().await.unwrap();
        assert_eq!(received.severity, Severity::Critical);
        assert_eq!(critical.queue.len(), 0);
    }

    #[tokio::test]
    async fn test_alert_service_filter() {
        let hub = small_hub();
        let web = hub.subscribe_alerts(Some("web".to_string()));
        let any = hub.subscribe_alerts(None);
        let tx = hub.alerts_sender();

        tx.send(alert("db", Severity::High)).unwrap();
        tx.send(alert("web", Severity::Low)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(any.recv().await.unwrap().service_name, "db");
        assert_eq!(web.recv().await.unwrap().service_name, "web");
    }

    #[tokio::test]
    async fn test_subscription_drop_aborts_forwarder() {
        let hub = small_hub();
        let sub = hub.subscribe_metrics_combined();
        let forwarder_handle = sub.forwarder.abort_handle();
        drop(sub);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(forwarder_handle.is_finished());
    }
}
