// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! PostgreSQL stores for PulseStream
//!
//! Three row stores share one pipelined connection:
//!
//! - `metrics`: append-only metric history
//! - `alerts`: alert history, append-only except the single resolution
//!   update per row
//! - `alert_rules`: operator-provisioned threshold rules
//!
//! Schema and indexes are created in code at startup
//! ([`Database::initialize_schema`]) and the default rules are seeded
//! idempotently; there is no external migration tooling.
//!
//! # Example
//!
//! ```rust,no_run
//! use pulsestream_store::{Database, StoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect(StoreConfig::from_env()).await?;
//! db.initialize_schema().await?;
//! let rules = db.rules();
//! # Ok(())
//! # }
//! ```

mod alerts;
mod error;
mod metrics;
mod rules;

pub use alerts::AlertStore;
pub use error::{Result, StoreError};
pub use metrics::MetricStore;
pub use rules::RuleStore;

use pulsestream::env_vars;
use std::sync::Arc;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL connection string.
    pub connection_string: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: "host=localhost user=pulsestream dbname=pulsestream".to_string(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from `DATABASE_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            connection_string: env_vars::env_string_or_default(
                env_vars::DATABASE_URL,
                "host=localhost user=pulsestream dbname=pulsestream",
            ),
        }
    }
}

/// Shared database handle; hands out the three stores.
#[derive(Clone)]
pub struct Database {
    client: Arc<Client>,
}

impl Database {
    /// Connect to PostgreSQL and spawn the connection driver task.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string, NoTls)
            .await
            .map_err(|e| {
                error!("failed to connect to PostgreSQL: {e}");
                StoreError::ConnectionError(e.to_string())
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {e}");
            }
        });

        info!("connected to PostgreSQL");
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Create tables and indexes if absent, and seed the default rules.
    pub async fn initialize_schema(&self) -> Result<()> {
        self.client
            .batch_execute(
                r"
                CREATE TABLE IF NOT EXISTS metrics (
                    id BIGSERIAL PRIMARY KEY,
                    service_name VARCHAR(100) NOT NULL,
                    metric_type VARCHAR(32) NOT NULL,
                    metric_value DOUBLE PRECISION NOT NULL,
                    unit VARCHAR(32),
                    timestamp TIMESTAMP NOT NULL,
                    hostname VARCHAR(255),
                    environment VARCHAR(16),
                    version VARCHAR(64),
                    tags TEXT,
                    created_at TIMESTAMP NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS idx_metrics_service_ts
                    ON metrics (service_name, timestamp DESC);
                CREATE INDEX IF NOT EXISTS idx_metrics_type_ts
                    ON metrics (metric_type, timestamp DESC);
                CREATE INDEX IF NOT EXISTS idx_metrics_service_type
                    ON metrics (service_name, metric_type);
                CREATE INDEX IF NOT EXISTS idx_metrics_ts
                    ON metrics (timestamp DESC);
                CREATE INDEX IF NOT EXISTS idx_metrics_environment
                    ON metrics (environment);

                CREATE TABLE IF NOT EXISTS alerts (
                    id BIGSERIAL PRIMARY KEY,
                    alert_id VARCHAR(36) NOT NULL UNIQUE,
                    service_name VARCHAR(100) NOT NULL,
                    alert_type VARCHAR(64) NOT NULL,
                    severity VARCHAR(16) NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    message TEXT NOT NULL,
                    description TEXT,
                    threshold_value DOUBLE PRECISION NOT NULL,
                    current_value DOUBLE PRECISION NOT NULL,
                    triggered_at TIMESTAMP NOT NULL,
                    resolved_at TIMESTAMP,
                    duration_seconds BIGINT,
                    hostname VARCHAR(255),
                    environment VARCHAR(16),
                    metadata TEXT,
                    created_at TIMESTAMP NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS idx_alerts_service ON alerts (service_name);
                CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts (status);
                CREATE INDEX IF NOT EXISTS idx_alerts_severity ON alerts (severity);
                CREATE INDEX IF NOT EXISTS idx_alerts_triggered_at
                    ON alerts (triggered_at DESC);
                CREATE INDEX IF NOT EXISTS idx_alerts_service_status
                    ON alerts (service_name, status);
                CREATE INDEX IF NOT EXISTS idx_alerts_type ON alerts (alert_type);

                CREATE TABLE IF NOT EXISTS alert_rules (
                    id BIGSERIAL PRIMARY KEY,
                    rule_name VARCHAR(100) NOT NULL UNIQUE,
                    service_name VARCHAR(100) NOT NULL,
                    metric_type VARCHAR(32) NOT NULL,
                    threshold_value DOUBLE PRECISION NOT NULL,
                    comparison_operator VARCHAR(8) NOT NULL,
                    duration_minutes INTEGER NOT NULL DEFAULT 0,
                    severity VARCHAR(16) NOT NULL,
                    enabled BOOLEAN NOT NULL DEFAULT TRUE,
                    description TEXT,
                    created_at TIMESTAMP NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMP NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS idx_rules_service_type
                    ON alert_rules (service_name, metric_type);
                ",
            )
            .await
            .map_err(|e| {
                error!("failed to create schema: {e}");
                StoreError::QueryError(e.to_string())
            })?;

        self.seed_default_rules().await?;
        info!("PostgreSQL schema initialized");
        Ok(())
    }

    /// Seed the default wildcard rules; existing rule names are left alone.
    async fn seed_default_rules(&self) -> Result<()> {
        self.client
            .batch_execute(
                r"
                INSERT INTO alert_rules
                    (rule_name, service_name, metric_type, threshold_value,
                     comparison_operator, duration_minutes, severity, enabled, description)
                VALUES
                    ('high-cpu-usage', '*', 'CPU', 80, 'GT', 5, 'HIGH', TRUE,
                     'CPU usage above 80 percent'),
                    ('high-memory-usage', '*', 'MEMORY', 85, 'GT', 5, 'HIGH', TRUE,
                     'Memory usage above 85 percent'),
                    ('high-error-rate', '*', 'ERROR_RATE', 5, 'GT', 2, 'CRITICAL', TRUE,
                     'Error rate above 5 percent'),
                    ('high-latency', '*', 'LATENCY', 1000, 'GT', 3, 'MEDIUM', TRUE,
                     'Latency above 1000 ms')
                ON CONFLICT (rule_name) DO NOTHING;
                ",
            )
            .await?;
        Ok(())
    }

    /// Metric history store.
    #[must_use]
    pub fn metrics(&self) -> MetricStore {
        MetricStore::new(Arc::clone(&self.client))
    }

    /// Alert history store.
    #[must_use]
    pub fn alerts(&self) -> AlertStore {
        AlertStore::new(Arc::clone(&self.client))
    }

    /// Alert rule store.
    #[must_use]
    pub fn rules(&self) -> RuleStore {
        RuleStore::new(Arc::clone(&self.client))
    }
}
