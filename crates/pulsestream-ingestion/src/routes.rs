// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! HTTP ingestion surface.
//!
//! `POST /api/metrics` accepts one metric, `POST /api/metrics/batch` 1–100.
//! Accepted submissions are published to the raw-metrics topic (keyed by
//! service) and answered with 202; validation failures never reach the
//! topic and come back as 400 with the full error list. Batches are
//! all-or-nothing: one invalid submission rejects the batch.

use crate::rate_limit::RequestRateLimiter;
use crate::validate::{self, MetricSubmission, ValidationConfig};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::join_all;
use pulsestream::producer::EventProducer;
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Largest accepted batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// State shared across ingestion handlers.
#[derive(Clone)]
pub struct AppState {
    /// Kafka publisher for accepted metrics.
    pub producer: Arc<EventProducer>,
    /// Validation rules.
    pub config: Arc<ValidationConfig>,
    /// Per-IP ingress limiter.
    pub limiter: Arc<RequestRateLimiter>,
}

/// Uniform response envelope.
#[derive(Debug, Serialize)]
struct ApiResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "eventIds")]
    event_ids: Option<Vec<String>>,
}

impl ApiResponse {
    fn accepted(message: impl Into<String>, event_ids: Vec<String>) -> Response {
        (
            StatusCode::ACCEPTED,
            Json(Self {
                success: true,
                message: message.into(),
                errors: None,
                event_ids: Some(event_ids),
            }),
        )
            .into_response()
    }

    fn rejected(status: StatusCode, message: impl Into<String>, errors: Vec<String>) -> Response {
        (
            status,
            Json(Self {
                success: false,
                message: message.into(),
                errors: Some(errors),
                event_ids: None,
            }),
        )
            .into_response()
    }
}

/// Build the ingestion router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/metrics", post(submit_metric))
        .route("/api/metrics/batch", post(submit_batch))
        .route("/api/metrics/health", get(health))
        .route("/healthz", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "UP" }))
}

async fn submit_metric(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<MetricSubmission>, JsonRejection>,
) -> Response {
    if !state.limiter.try_acquire(&addr.ip().to_string()) {
        return ApiResponse::rejected(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded",
            vec!["too many requests from this client".to_string()],
        );
    }
    let Json(submission) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return ApiResponse::rejected(
                StatusCode::BAD_REQUEST,
                "Malformed request body",
                vec![rejection.body_text()],
            );
        }
    };

    let event = match validate::validate(&submission, &state.config) {
        Ok(event) => event,
        Err(errors) => {
            return ApiResponse::rejected(StatusCode::BAD_REQUEST, "Validation failed", errors);
        }
    };

    match state.producer.publish_metric(&event).await {
        Ok((partition, offset)) => {
            info!(
                service = %event.service_name,
                metric_type = %event.metric_type,
                partition,
                offset,
                "metric accepted"
            );
            ApiResponse::accepted("Metric accepted", vec![event.event_id.to_string()])
        }
        Err(e) => {
            error!(service = %event.service_name, error = %e, "metric publish failed");
            ApiResponse::rejected(
                StatusCode::SERVICE_UNAVAILABLE,
                "Metric could not be queued",
                vec![e.to_string()],
            )
        }
    }
}

async fn submit_batch(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<Vec<MetricSubmission>>, JsonRejection>,
) -> Response {
    if !state.limiter.try_acquire(&addr.ip().to_string()) {
        return ApiResponse::rejected(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded",
            vec!["too many requests from this client".to_string()],
        );
    }
    let Json(submissions) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return ApiResponse::rejected(
                StatusCode::BAD_REQUEST,
                "Malformed request body",
                vec![rejection.body_text()],
            );
        }
    };

    if submissions.is_empty() || submissions.len() > MAX_BATCH_SIZE {
        return ApiResponse::rejected(
            StatusCode::BAD_REQUEST,
            "Validation failed",
            vec![format!(
                "batch size {} is outside 1..={MAX_BATCH_SIZE}",
                submissions.len()
            )],
        );
    }

    let mut events = Vec::with_capacity(submissions.len());
    let mut errors = Vec::new();
    for (index, submission) in submissions.iter().enumerate() {
        match validate::validate(submission, &state.config) {
            Ok(event) => events.push(event),
            Err(item_errors) => {
                errors.extend(item_errors.into_iter().map(|e| format!("[{index}] {e}")));
            }
        }
    }
    if !errors.is_empty() {
        return ApiResponse::rejected(StatusCode::BAD_REQUEST, "Validation failed", errors);
    }

    let results = join_all(events.iter().map(|event| state.producer.publish_metric(event))).await;
    let failed: Vec<String> = results
        .iter()
        .filter_map(|r| r.as_ref().err().map(ToString::to_string))
        .collect();
    if !failed.is_empty() {
        error!(failed = failed.len(), total = events.len(), "batch publish partially failed");
        return ApiResponse::rejected(
            StatusCode::SERVICE_UNAVAILABLE,
            "Batch could not be fully queued",
            failed,
        );
    }

    info!(count = events.len(), "batch accepted");
    ApiResponse::accepted(
        format!("{} metrics accepted", events.len()),
        events.iter().map(|e| e.event_id.to_string()).collect(),
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shapes() {
        let rejected = ApiResponse {
            success: false,
            message: "Validation failed".to_string(),
            errors: Some(vec!["metricValue must not be negative".to_string()]),
            event_ids: None,
        };
        let body = serde_json::to_value(&rejected).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["errors"].is_array());
        assert!(body.get("eventIds").is_none());

        let accepted = ApiResponse {
            success: true,
            message: "Metric accepted".to_string(),
            errors: None,
            event_ids: Some(vec!["id".to_string()]),
        };
        let body = serde_json::to_value(&accepted).unwrap();
        assert_eq!(body["success"], true);
        assert!(body.get("errors").is_none());
    }
}
