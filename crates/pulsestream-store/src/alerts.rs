// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Alert history: append on trigger, one update on resolution.

use crate::error::Result;
use async_trait::async_trait;
use pulsestream::backend::AlertHistory;
use pulsestream::event::AlertEvent;
use std::sync::Arc;
use tokio_postgres::Client;
use tracing::{debug, warn};

/// Writer for the `alerts` table.
#[derive(Clone)]
pub struct AlertStore {
    client: Arc<Client>,
}

impl AlertStore {
    pub(crate) fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Append the triggered alert.
    ///
    /// `alert_id` carries a unique index; a conflict means the row is
    /// already persisted (redelivery), which is success.
    pub async fn insert_triggered(&self, alert: &AlertEvent) -> Result<()> {
        let metadata = alert
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| crate::StoreError::InvalidRow(e.to_string()))?;

        let inserted = self
            .client
            .execute(
                r"
                INSERT INTO alerts
                    (alert_id, service_name, alert_type, severity, status, message,
                     description, threshold_value, current_value, triggered_at,
                     resolved_at, duration_seconds, hostname, environment, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (alert_id) DO NOTHING
                ",
                &[
                    &alert.alert_id.to_string(),
                    &alert.service_name,
                    &alert.alert_type,
                    &alert.severity.as_str(),
                    &alert.status.as_str(),
                    &alert.message,
                    &alert.description,
                    &alert.threshold_value,
                    &alert.current_value,
                    &alert.triggered_at,
                    &alert.resolved_at,
                    &alert.duration_seconds,
                    &alert.hostname,
                    &alert.environment.map(|e| e.as_str()),
                    &metadata,
                ],
            )
            .await?;
        if inserted == 0 {
            debug!(alert_id = %alert.alert_id, "alert row already persisted; treating as success");
        }
        Ok(())
    }

    /// Apply the single resolution update to the row matching `alert_id`.
    pub async fn mark_resolved(&self, alert: &AlertEvent) -> Result<()> {
        let updated = self
            .client
            .execute(
                r"
                UPDATE alerts
                SET status = $2, resolved_at = $3, duration_seconds = $4
                WHERE alert_id = $1
                ",
                &[
                    &alert.alert_id.to_string(),
                    &alert.status.as_str(),
                    &alert.resolved_at,
                    &alert.duration_seconds,
                ],
            )
            .await?;
        if updated == 0 {
            // Possible when the trigger-time persist degraded; the publish
            // stream still carries the resolution.
            warn!(alert_id = %alert.alert_id, "no alert row matched resolution update");
        }
        Ok(())
    }
}

#[async_trait]
impl AlertHistory for AlertStore {
    async fn insert_triggered(&self, alert: &AlertEvent) -> pulsestream::Result<()> {
        AlertStore::insert_triggered(self, alert)
            .await
            .map_err(pulsestream::Error::from)
    }

    async fn mark_resolved(&self, alert: &AlertEvent) -> pulsestream::Result<()> {
        AlertStore::mark_resolved(self, alert)
            .await
            .map_err(pulsestream::Error::from)
    }
}
