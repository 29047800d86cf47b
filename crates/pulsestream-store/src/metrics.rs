// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Append-only metric history.

use crate::error::Result;
use async_trait::async_trait;
use pulsestream::backend::MetricHistory;
use pulsestream::event::MetricEvent;
use std::sync::Arc;
use tokio_postgres::Client;
use tracing::debug;

/// Writer for the `metrics` table.
#[derive(Clone)]
pub struct MetricStore {
    client: Arc<Client>,
}

impl MetricStore {
    pub(crate) fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Append one metric row.
    pub async fn insert(&self, event: &MetricEvent) -> Result<()> {
        let tags = event
            .tags
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| crate::StoreError::InvalidRow(e.to_string()))?;

        self.client
            .execute(
                r"
                INSERT INTO metrics
                    (service_name, metric_type, metric_value, unit, timestamp,
                     hostname, environment, version, tags, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, NOW()))
                ",
                &[
                    &event.service_name,
                    &event.metric_type.as_str(),
                    &event.metric_value,
                    &event.unit,
                    &event.timestamp,
                    &event.hostname,
                    &event.environment.map(|e| e.as_str()),
                    &event.version,
                    &tags,
                    &event.created_at,
                ],
            )
            .await?;
        debug!(service = %event.service_name, metric_type = %event.metric_type, "metric row appended");
        Ok(())
    }
}

#[async_trait]
impl MetricHistory for MetricStore {
    async fn insert_metric(&self, event: &MetricEvent) -> pulsestream::Result<()> {
        self.insert(event).await.map_err(pulsestream::Error::from)
    }
}
