// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Outbound notification channels.
//!
//! Dispatch is best-effort by contract: a channel failure is logged and
//! never fails the alert consumer. All three concrete channels speak HTTP
//! through a shared client carrying the per-call timeout: Slack incoming
//! webhooks, a generic webhook receiving the alert JSON verbatim, and an
//! HTTP mail gateway for email.

use async_trait::async_trait;
use pulsestream::env_vars;
use pulsestream::event::{AlertEvent, AlertStatus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default per-call timeout for outbound sends, in seconds.
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

/// One outbound notification sink.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name as it appears in `notifications.enabledChannels`.
    fn name(&self) -> &'static str;

    /// Deliver one alert. Failure is the caller's to log, not to retry.
    async fn notify(&self, alert: &AlertEvent) -> pulsestream::Result<()>;
}

fn send_error(channel: &str, err: &reqwest::Error) -> pulsestream::Error {
    pulsestream::Error::Io(std::io::Error::other(format!("{channel} send failed: {err}")))
}

/// Human-readable one-line summary used by the chat-style channels.
fn summary(alert: &AlertEvent) -> String {
    let marker = match alert.status {
        AlertStatus::Active => "firing",
        AlertStatus::Resolved | AlertStatus::AutoResolved => "resolved",
        _ => "updated",
    };
    format!(
        "[{}] {} {} ({}): {}",
        alert.severity, alert.service_name, alert.alert_type, marker, alert.message
    )
}

/// Slack incoming-webhook channel.
pub struct SlackChannel {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackChannel {
    /// Channel posting to the given incoming-webhook URL.
    #[must_use]
    pub fn new(client: reqwest::Client, webhook_url: String) -> Self {
        Self {
            client,
            webhook_url,
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn notify(&self, alert: &AlertEvent) -> pulsestream::Result<()> {
        self.client
            .post(&self.webhook_url)
            .json(&json!({ "text": summary(alert) }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| send_error("slack", &e))?;
        Ok(())
    }
}

/// Generic webhook channel: the alert's wire JSON, verbatim.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    /// Channel posting to the given URL.
    #[must_use]
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, alert: &AlertEvent) -> pulsestream::Result<()> {
        self.client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| send_error("webhook", &e))?;
        Ok(())
    }
}

/// Email via an HTTP mail gateway.
pub struct EmailChannel {
    client: reqwest::Client,
    api_url: String,
    recipients: Vec<String>,
}

impl EmailChannel {
    /// Channel posting to the given mail-gateway endpoint.
    #[must_use]
    pub fn new(client: reqwest::Client, api_url: String, recipients: Vec<String>) -> Self {
        Self {
            client,
            api_url,
            recipients,
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, alert: &AlertEvent) -> pulsestream::Result<()> {
        self.client
            .post(&self.api_url)
            .json(&json!({
                "to": self.recipients,
                "subject": format!("[{}] {} {}", alert.severity, alert.service_name, alert.alert_type),
                "body": summary(alert),
            }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| send_error("email", &e))?;
        Ok(())
    }
}

/// Assemble the enabled channels from the environment.
///
/// `NOTIFY_ENABLED_CHANNELS` selects the subset; a selected channel missing
/// its endpoint configuration is skipped with a warning rather than
/// half-configured.
#[must_use]
pub fn channels_from_env() -> Vec<Arc<dyn NotificationChannel>> {
    let timeout = Duration::from_secs(env_vars::env_u64_or_default(
        env_vars::NOTIFY_SEND_TIMEOUT_SECS,
        DEFAULT_SEND_TIMEOUT_SECS,
    ));
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "failed to build HTTP client; notifications disabled");
            return Vec::new();
        }
    };

    let enabled = env_vars::env_csv_or_default(env_vars::NOTIFY_ENABLED_CHANNELS, "slack,webhook");
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
    for name in &enabled {
        match name.as_str() {
            "slack" => match env_vars::env_string(env_vars::NOTIFY_SLACK_WEBHOOK_URL) {
                Some(url) => channels.push(Arc::new(SlackChannel::new(client.clone(), url))),
                None => warn!("slack channel enabled but NOTIFY_SLACK_WEBHOOK_URL unset; skipping"),
            },
            "webhook" => match env_vars::env_string(env_vars::NOTIFY_WEBHOOK_URL) {
                Some(url) => channels.push(Arc::new(WebhookChannel::new(client.clone(), url))),
                None => warn!("webhook channel enabled but NOTIFY_WEBHOOK_URL unset; skipping"),
            },
            "email" => {
                let api_url = env_vars::env_string(env_vars::NOTIFY_EMAIL_API_URL);
                let recipients =
                    env_vars::env_csv_or_default(env_vars::NOTIFY_EMAIL_RECIPIENTS, "");
                match api_url {
                    Some(api_url) if !recipients.is_empty() => {
                        channels.push(Arc::new(EmailChannel::new(client.clone(), api_url, recipients)));
                    }
                    _ => warn!("email channel enabled but gateway or recipients unset; skipping"),
                }
            }
            other => warn!(channel = other, "unknown notification channel; skipping"),
        }
    }
    info!(
        channels = ?channels.iter().map(|c| c.name()).collect::<Vec<_>>(),
        "notification channels assembled"
    );
    channels
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use pulsestream::event::{wire_time, Severity};
    use uuid::Uuid;

    #[test]
    fn test_summary_reads_like_a_pager_line() {
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
            triggered_at: wire_time::parse("2026-03-14T10:00:00").unwrap(),
            resolved_at: None,
            duration_seconds: None,
            hostname: None,
            environment: None,
            metadata: None,
        };
        assert_eq!(
            summary(&alert),
            "[HIGH] web CPU_HIGH (firing): CPU usage > threshold exceeded: current=92, threshold=80"
        );
        alert.status = AlertStatus::Resolved;
        assert!(summary(&alert).contains("(resolved)"));
    }
}
