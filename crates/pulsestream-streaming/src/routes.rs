// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! SSE routes for live dashboards.
//!
//! Content type `text/event-stream`; every event's id is the underlying
//! event's natural id, and the event name tells the dashboard what arrived:
//! `metric`, `latest-metric`, `alert-triggered`, `alert-resolved`,
//! `alert-acknowledged`, `alert-update`, `alert-active`, `alert-critical`,
//! `heartbeat`. CORS is permissive across `/api/**`; dashboards are
//! served from anywhere.

use crate::hub::{StreamHub, Subscription};
use crate::latest;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures::Stream;
use pulsestream::backend::{AlertStateCache, MetricCache};
use pulsestream::event::{wire_time, AlertEvent, AlertStatus, MetricEvent};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// State shared across SSE handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared fan-out of live metrics and alerts.
    pub hub: Arc<StreamHub>,
    /// Latest-value side of the cache.
    pub metric_cache: Arc<dyn MetricCache>,
    /// Alert-state side of the cache (seeds the active-alerts stream).
    pub alert_cache: Arc<dyn AlertStateCache>,
}

/// Optional `?serviceName=` filter.
#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    #[serde(rename = "serviceName")]
    service_name: Option<String>,
}

/// Build the streaming router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/stream/metrics", get(stream_metrics))
        .route("/api/stream/metrics/latest", get(stream_latest_metrics))
        .route("/api/stream/metrics/heartbeat", get(stream_heartbeat))
        .route("/api/stream/metrics/:service", get(stream_metrics_for_service))
        .route("/api/stream/alerts", get(stream_alerts))
        .route("/api/stream/alerts/active", get(stream_active_alerts))
        .route("/api/stream/alerts/critical", get(stream_critical_alerts))
        .route("/api/stream/alerts/:service", get(stream_alerts_for_service))
        .route("/healthz", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type EventStream = Sse<std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

fn sse(stream: impl Stream<Item = Result<Event, Infallible>> + Send + 'static) -> EventStream {
    Sse::new(Box::pin(stream) as std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>)
        .keep_alive(KeepAlive::default())
}

fn metric_event(event: &MetricEvent, name: &'static str) -> Option<Event> {
    match Event::default()
        .event(name)
        .id(event.event_id.to_string())
        .json_data(event)
    {
        Ok(sse_event) => Some(sse_event),
        Err(e) => {
            warn!(error = %e, "failed to serialize metric for SSE");
            None
        }
    }
}

/// Event name derived from the alert's lifecycle state.
fn alert_event_name(status: AlertStatus) -> &'static str {
    match status {
        AlertStatus::Active => "alert-triggered",
        AlertStatus::Resolved | AlertStatus::AutoResolved => "alert-resolved",
        AlertStatus::Acknowledged => "alert-acknowledged",
        AlertStatus::Suppressed | AlertStatus::Pending => "alert-update",
    }
}

fn alert_event(alert: &AlertEvent, name_override: Option<&'static str>) -> Option<Event> {
    let name = name_override.unwrap_or_else(|| alert_event_name(alert.status));
    match Event::default()
        .event(name)
        .id(alert.alert_id.to_string())
        .json_data(alert)
    {
        Ok(sse_event) => Some(sse_event),
        Err(e) => {
            warn!(error = %e, "failed to serialize alert for SSE");
            None
        }
    }
}

fn metric_sse(sub: Subscription<MetricEvent>, name: &'static str) -> EventStream {
    sse(async_stream::stream! {
        while let Some(event) = sub.recv().await {
            if let Some(sse_event) = metric_event(&event, name) {
                yield Ok(sse_event);
            }
        }
    })
}

fn alert_sse(sub: Subscription<AlertEvent>, name_override: Option<&'static str>) -> EventStream {
    sse(async_stream::stream! {
        while let Some(alert) = sub.recv().await {
            if let Some(sse_event) = alert_event(&alert, name_override) {
                yield Ok(sse_event);
            }
        }
    })
}

/// Combined live metric stream across every service.
async fn stream_metrics(State(state): State<AppState>) -> EventStream {
    metric_sse(state.hub.subscribe_metrics_combined(), "metric")
}

/// Live metric stream for one service.
async fn stream_metrics_for_service(
    Path(service): Path<String>,
    State(state): State<AppState>,
) -> EventStream {
    metric_sse(state.hub.subscribe_metrics_for_service(service), "metric")
}

/// Periodic latest-value snapshots from the cache.
async fn stream_latest_metrics(
    Query(query): Query<ServiceQuery>,
    State(state): State<AppState>,
) -> EventStream {
    let sub = latest::subscribe_latest(
        Arc::clone(&state.metric_cache),
        query.service_name,
        state.hub.config().heartbeat_interval,
    );
    sse(async_stream::stream! {
        while let Some(snapshot) = sub.recv().await {
            for event in &snapshot {
                if let Some(sse_event) = metric_event(event, "latest-metric") {
                    yield Ok(sse_event);
                }
            }
        }
    })
}

/// Heartbeat ticks for connection liveness.
async fn stream_heartbeat(State(state): State<AppState>) -> EventStream {
    let interval = state.hub.config().heartbeat_interval;
    sse(async_stream::stream! {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let payload = json!({ "timestamp": wire_time::format(&Utc::now().naive_utc()) });
            match Event::default().event("heartbeat").json_data(&payload) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(e) => warn!(error = %e, "failed to serialize heartbeat"),
            }
        }
    })
}

/// All alert lifecycle events, named by status.
async fn stream_alerts(State(state): State<AppState>) -> EventStream {
    alert_sse(state.hub.subscribe_alerts(None), None)
}

/// Alert lifecycle events for one service.
async fn stream_alerts_for_service(
    Path(service): Path<String>,
    State(state): State<AppState>,
) -> EventStream {
    alert_sse(state.hub.subscribe_alerts(Some(service)), None)
}

/// Currently ACTIVE alerts seeded from the cache, then live updates.
async fn stream_active_alerts(
    Query(query): Query<ServiceQuery>,
    State(state): State<AppState>,
) -> EventStream {
    // Subscribe before scanning: an alert raised between the scan and the
    // subscription may arrive twice, never not at all.
    let sub = state.hub.subscribe_alerts(query.service_name.clone());
    let seed = state
        .alert_cache
        .scan_alert_states(query.service_name.as_deref())
        .await
        .unwrap_or_default();
    sse(async_stream::stream! {
        for alert in seed.iter().filter(|alert| alert.is_active()) {
            if let Some(sse_event) = alert_event(alert, Some("alert-active")) {
                yield Ok(sse_event);
            }
        }
        while let Some(alert) = sub.recv().await {
            if let Some(sse_event) = alert_event(&alert, None) {
                yield Ok(sse_event);
            }
        }
    })
}

/// Critical-severity alerts only.
async fn stream_critical_alerts(State(state): State<AppState>) -> EventStream {
    alert_sse(state.hub.subscribe_critical_alerts(), Some("alert-critical"))
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_event_names_follow_status() {
        assert_eq!(alert_event_name(AlertStatus::Active), "alert-triggered");
        assert_eq!(alert_event_name(AlertStatus::Resolved), "alert-resolved");
        assert_eq!(alert_event_name(AlertStatus::AutoResolved), "alert-resolved");
        assert_eq!(
            alert_event_name(AlertStatus::Acknowledged),
            "alert-acknowledged"
        );
        assert_eq!(alert_event_name(AlertStatus::Suppressed), "alert-update");
        assert_eq!(alert_event_name(AlertStatus::Pending), "alert-update");
    }
}
