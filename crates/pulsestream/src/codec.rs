// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # Event Codec
//!
//! The bit-compatible JSON wire form for [`MetricEvent`] and [`AlertEvent`]
//! that every service consumes and produces. Field names are lowerCamelCase,
//! enum values the exact uppercase constant names, timestamps local
//! `yyyy-MM-dd'T'HH:mm:ss`. Unknown fields are ignored on read; `tags` and
//! `metadata` are omitted when absent.
//!
//! ## Example
//!
//! ```rust
//! use pulsestream::codec::{decode_metric, encode_metric};
//! use pulsestream::event::{MetricEvent, MetricType};
//!
//! let event = MetricEvent::new(
//!     "web",
//!     MetricType::Cpu,
//!     92.0,
//!     pulsestream::event::wire_time::parse("2026-03-14T10:00:00").unwrap(),
//! );
//! let bytes = encode_metric(&event).unwrap();
//! assert_eq!(decode_metric(&bytes).unwrap(), event);
//! ```

use crate::error::Result;
use crate::event::{AlertEvent, MetricEvent};

/// Encode a metric event to its JSON wire form.
pub fn encode_metric(event: &MetricEvent) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(event)?)
}

/// Decode a metric event from its JSON wire form.
pub fn decode_metric(payload: &[u8]) -> Result<MetricEvent> {
    Ok(serde_json::from_slice(payload)?)
}

/// Encode an alert event to its JSON wire form.
pub fn encode_alert(event: &AlertEvent) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(event)?)
}

/// Decode an alert event from its JSON wire form.
pub fn decode_alert(payload: &[u8]) -> Result<AlertEvent> {
    Ok(serde_json::from_slice(payload)?)
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        wire_time, AlertStatus, Environment, MetricType, Severity,
    };
    use std::collections::HashMap;
    use uuid::Uuid;

    fn full_metric() -> MetricEvent {
        let mut tags = HashMap::new();
        tags.insert("region".to_string(), "us-east-1".to_string());
        tags.insert("team".to_string(), "payments".to_string());
        MetricEvent {
            event_id: Uuid::new_v4(),
            service_name: "checkout".to_string(),
            metric_type: MetricType::ErrorRate,
            metric_value: 3.25,
            timestamp: wire_time::parse("2026-03-14T10:00:00").unwrap(),
            unit: Some("percent".to_string()),
            hostname: Some("web-04".to_string()),
            environment: Some(Environment::Production),
            version: Some("2.11.0".to_string()),
            tags: Some(tags),
            created_at: Some(wire_time::parse("2026-03-14T10:00:01").unwrap()),
        }
    }

    fn full_alert() -> AlertEvent {
        let mut metadata = HashMap::new();
        metadata.insert("ruleName".to_string(), "high-error-rate".to_string());
        AlertEvent {
            alert_id: Uuid::new_v4(),
            service_name: "checkout".to_string(),
            alert_type: "ERROR_RATE_CRITICAL".to_string(),
            severity: Severity::Critical,
            status: AlertStatus::Resolved,
            message: "Error rate > threshold exceeded: current=7.5, threshold=5".to_string(),
            description: Some("Error rate above 5 percent".to_string()),
            threshold_value: 5.0,
            current_value: 1.2,
            triggered_at: wire_time::parse("2026-03-14T10:00:00").unwrap(),
            resolved_at: Some(wire_time::parse("2026-03-14T10:04:30").unwrap()),
            duration_seconds: Some(270),
            hostname: Some("web-04".to_string()),
            environment: Some(Environment::Production),
            metadata: Some(metadata),
        }
    }

    #[test]
    fn test_metric_round_trip_preserves_every_field() {
        let event = full_metric();
        let decoded = decode_metric(&encode_metric(&event).unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_alert_round_trip_preserves_every_field() {
        let event = full_alert();
        let decoded = decode_alert(&encode_alert(&event).unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_wire_field_names_are_lower_camel_case() {
        let json: serde_json::Value =
            serde_json::from_slice(&encode_metric(&full_metric()).unwrap()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("eventId"));
        assert!(obj.contains_key("serviceName"));
        assert!(obj.contains_key("metricType"));
        assert!(obj.contains_key("metricValue"));
        assert!(obj.contains_key("createdAt"));
        assert_eq!(obj["metricType"], "ERROR_RATE");
        assert_eq!(obj["environment"], "production");
        assert_eq!(obj["timestamp"], "2026-03-14T10:00:00");
    }

    #[test]
    fn test_tags_omitted_when_absent() {
        let mut event = full_metric();
        event.tags = None;
        let json: serde_json::Value =
            serde_json::from_slice(&encode_metric(&event).unwrap()).unwrap();
        assert!(json.get("tags").is_none());
    }

    #[test]
    fn test_unknown_fields_ignored_on_read() {
        let mut json: serde_json::Value =
            serde_json::from_slice(&encode_metric(&full_metric()).unwrap()).unwrap();
        json["futureField"] = serde_json::json!({"nested": [1, 2, 3]});
        let decoded = decode_metric(json.to_string().as_bytes()).unwrap();
        assert_eq!(decoded.service_name, "checkout");
    }

    #[test]
    fn test_alert_status_wire_constants() {
        let mut alert = full_alert();
        alert.status = AlertStatus::AutoResolved;
        let json: serde_json::Value =
            serde_json::from_slice(&encode_alert(&alert).unwrap()).unwrap();
        assert_eq!(json["status"], "AUTO_RESOLVED");
        assert_eq!(json["severity"], "CRITICAL");
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(decode_metric(b"{\"serviceName\": ").is_err());
        assert!(decode_alert(b"not json at all").is_err());
    }
}
