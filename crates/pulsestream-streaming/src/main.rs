// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Streaming service binary.
//!
//! Starts the two shared Kafka pumps (offset-reset latest, never replaying
//! history to dashboards), connects the latest-value cache, and serves the
//! SSE routes.

use anyhow::Context;
use pulsestream::backend::{AlertStateCache, MetricCache};
use pulsestream::consumer::{create_stream_consumer, ConsumerConfig};
use pulsestream::env_vars;
use pulsestream::kafka::{Topics, GROUP_STREAMING_ALERTS, GROUP_STREAMING_METRICS};
use pulsestream_cache::{CacheClient, CacheConfig};
use pulsestream_streaming::routes::{router, AppState};
use pulsestream_streaming::{hub, HubConfig, StreamHub};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let topics = Topics::from_env();
    let cache = Arc::new(
        CacheClient::connect(CacheConfig::from_env())
            .await
            .context("Redis connection failed")?,
    );
    let stream_hub = Arc::new(StreamHub::new(HubConfig::from_env()));

    let metrics_consumer = create_stream_consumer(&ConsumerConfig::streaming(
        topics.metrics_raw.clone(),
        GROUP_STREAMING_METRICS,
    ))
    .context("metrics consumer creation failed")?;
    let alerts_consumer = create_stream_consumer(&ConsumerConfig::streaming(
        topics.alerts.clone(),
        GROUP_STREAMING_ALERTS,
    ))
    .context("alerts consumer creation failed")?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    spawn_shutdown_listener(shutdown_tx.clone());

    tokio::spawn(hub::run_metric_pump(
        metrics_consumer,
        stream_hub.metrics_sender(),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(hub::run_alert_pump(
        alerts_consumer,
        stream_hub.alerts_sender(),
        shutdown_tx.subscribe(),
    ));

    let state = AppState {
        hub: stream_hub,
        metric_cache: Arc::clone(&cache) as Arc<dyn MetricCache>,
        alert_cache: cache as Arc<dyn AlertStateCache>,
    };
    let app = router(state);

    let host = env_vars::env_string_or_default(env_vars::STREAMING_HOST, "127.0.0.1");
    let port = env_vars::env_u16_or_default(env_vars::STREAMING_PORT, 8081);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .context("streaming listener bind failed")?;
    info!(host = %host, port, "streaming service listening");

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .context("streaming server failed")?;

    info!("streaming service stopped");
    Ok(())
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
