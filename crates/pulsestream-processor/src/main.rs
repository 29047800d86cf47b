// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Processing & alert service binary.
//!
//! Wires the Redis cache, PostgreSQL stores and Kafka producer into the
//! aggregator and alert engine, then drains `metrics.raw` with the
//! `processing.metrics` group. Offsets are committed per record, only after
//! processing succeeds; on shutdown the consumer state is committed
//! synchronously.

use anyhow::Context;
use axum::{routing::get, Router};
use pulsestream::backend::{
    AlertHistory, AlertSink, AlertStateCache, MetricCache, MetricHistory, RuleSource,
};
use pulsestream::consumer::{create_stream_consumer, ConsumerConfig};
use pulsestream::env_vars;
use pulsestream::kafka::{Topics, GROUP_PROCESSING_METRICS};
use pulsestream::producer::{EventProducer, ProducerConfig};
use pulsestream_cache::{CacheClient, CacheConfig};
use pulsestream_processor::{Aggregator, AlertEngine};
use pulsestream_store::{Database, StoreConfig};
use rdkafka::consumer::{CommitMode, Consumer};
use rdkafka::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let topics = Topics::from_env();
    let cache = CacheClient::connect(CacheConfig::from_env())
        .await
        .context("Redis connection failed")?;
    let db = Database::connect(StoreConfig::from_env())
        .await
        .context("PostgreSQL connection failed")?;
    db.initialize_schema()
        .await
        .context("schema initialization failed")?;
    let producer =
        Arc::new(EventProducer::new(ProducerConfig::from_env()).context("producer creation failed")?);

    let cache = Arc::new(cache);
    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&cache) as Arc<dyn MetricCache>,
        Arc::new(db.metrics()) as Arc<dyn MetricHistory>,
    ));
    let engine = Arc::new(AlertEngine::new(
        Arc::new(db.rules()) as Arc<dyn RuleSource>,
        Arc::clone(&cache) as Arc<dyn AlertStateCache>,
        Arc::new(db.alerts()) as Arc<dyn AlertHistory>,
        Arc::clone(&producer) as Arc<dyn AlertSink>,
    ));

    let consumer = create_stream_consumer(&ConsumerConfig::processing(
        topics.metrics_raw.clone(),
        GROUP_PROCESSING_METRICS,
    ))
    .context("consumer creation failed")?;

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    spawn_shutdown_listener(shutdown_tx.clone());
    spawn_health_listener(shutdown_tx.subscribe()).await?;

    info!(topic = %topics.metrics_raw, group = GROUP_PROCESSING_METRICS, "processor started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutdown signal received; committing consumer state");
                if let Err(e) = consumer.commit_consumer_state(CommitMode::Sync) {
                    warn!(error = %e, "final consumer commit failed");
                }
                break;
            }
            result = consumer.recv() => {
                match result {
                    Ok(msg) => {
                        let Some(payload) = msg.payload() else {
                            // Empty payload cannot become a metric; skip it
                            // rather than wedge the partition.
                            warn!(offset = msg.offset(), "record without payload; advancing");
                            commit(&consumer, &msg);
                            continue;
                        };
                        let metric = match pulsestream::codec::decode_metric(payload) {
                            Ok(metric) => metric,
                            Err(e) => {
                                warn!(
                                    offset = msg.offset(),
                                    partition = msg.partition(),
                                    error = %e,
                                    "malformed metric record; advancing past poison pill"
                                );
                                commit(&consumer, &msg);
                                continue;
                            }
                        };

                        // Dual-track: aggregation cannot fail, the engine can.
                        let (outcome, engine_result) =
                            tokio::join!(aggregator.process(&metric), engine.process(&metric));
                        if !outcome.persisted {
                            warn!(service = %metric.service_name, "metric not persisted; history has a gap");
                        }
                        match engine_result {
                            Ok(report) => {
                                if !report.triggered.is_empty() || !report.resolved.is_empty() {
                                    info!(
                                        service = %metric.service_name,
                                        triggered = report.triggered.len(),
                                        resolved = report.resolved.len(),
                                        "alert state changed"
                                    );
                                }
                                commit(&consumer, &msg);
                            }
                            Err(e) => {
                                // No commit: the log redelivers this record.
                                error!(
                                    service = %metric.service_name,
                                    offset = msg.offset(),
                                    error = %e,
                                    "alert evaluation failed; leaving record unacknowledged"
                                );
                                tokio::time::sleep(Duration::from_millis(500)).await;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "consumer receive error; retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }

    producer.flush(Duration::from_secs(5)).await.ok();
    info!("processor stopped");
    Ok(())
}

fn commit(consumer: &rdkafka::consumer::StreamConsumer, msg: &rdkafka::message::BorrowedMessage<'_>) {
    if let Err(e) = consumer.commit_message(msg, CommitMode::Async) {
        warn!(offset = msg.offset(), error = %e, "offset commit failed");
    }
}

fn spawn_shutdown_listener(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        let _ = shutdown_tx.send(());
    });
}

async fn spawn_health_listener(mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let port = env_vars::env_u16_or_default(env_vars::PROCESSOR_HEALTH_PORT, 8082);
    let app = Router::new().route("/healthz", get(|| async { "ok" }));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .context("health listener bind failed")?;
    info!(port, "health endpoint listening");
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "health listener failed");
        }
    });
    Ok(())
}
