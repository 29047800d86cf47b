// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Queryable alert rules with wildcard service matching.
//!
//! Wildcard handling is pushed into the query so the hot path stays one
//! indexed read; the ORDER BY pins service-specific rules strictly before
//! wildcard rules, tie-broken by insertion order.

use crate::error::{Result, StoreError};
use async_trait::async_trait;
use pulsestream::backend::RuleSource;
use pulsestream::event::{ComparisonOperator, MetricType, Severity};
use pulsestream::rule::AlertRule;
use std::sync::Arc;
use tokio_postgres::{Client, Row};
use tracing::warn;

/// Reader for the `alert_rules` table.
#[derive(Clone)]
pub struct RuleStore {
    client: Arc<Client>,
}

impl RuleStore {
    pub(crate) fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// All enabled rules matching `(service, metricType)`: exact metric
    /// type, service name equal to the target or `*`. Rows that fail to
    /// parse (e.g. an unknown operator edited in by hand) are skipped with
    /// a warning rather than failing the evaluation sweep.
    pub async fn find_applicable(
        &self,
        service: &str,
        metric_type: MetricType,
    ) -> Result<Vec<AlertRule>> {
        let rows = self
            .client
            .query(
                r"
                SELECT rule_name, service_name, metric_type, threshold_value,
                       comparison_operator, duration_minutes, severity, enabled,
                       description
                FROM alert_rules
                WHERE enabled = TRUE
                  AND metric_type = $2
                  AND service_name IN ($1, '*')
                ORDER BY CASE WHEN service_name = '*' THEN 1 ELSE 0 END, id
                ",
                &[&service, &metric_type.as_str()],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| match Self::rule_from_row(row) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable alert rule row");
                    None
                }
            })
            .collect())
    }

    fn rule_from_row(row: &Row) -> Result<AlertRule> {
        let metric_type: String = row.get(2);
        let operator: String = row.get(4);
        let severity: String = row.get(6);
        let duration_minutes: i32 = row.get(5);

        Ok(AlertRule {
            rule_name: row.get(0),
            service_name: row.get(1),
            metric_type: MetricType::from_wire(&metric_type)
                .ok_or_else(|| StoreError::InvalidRow(format!("unknown metric type '{metric_type}'")))?,
            threshold_value: row.get(3),
            comparison_operator: ComparisonOperator::from_wire(&operator)
                .ok_or_else(|| StoreError::InvalidRow(format!("unknown operator '{operator}'")))?,
            duration_minutes: u32::try_from(duration_minutes.max(0)).unwrap_or(0),
            severity: Severity::from_wire(&severity)
                .ok_or_else(|| StoreError::InvalidRow(format!("unknown severity '{severity}'")))?,
            enabled: row.get(7),
            description: row.get(8),
        })
    }
}

#[async_trait]
impl RuleSource for RuleStore {
    async fn find_applicable(
        &self,
        service: &str,
        metric_type: MetricType,
    ) -> pulsestream::Result<Vec<AlertRule>> {
        RuleStore::find_applicable(self, service, metric_type)
            .await
            .map_err(pulsestream::Error::from)
    }
}
