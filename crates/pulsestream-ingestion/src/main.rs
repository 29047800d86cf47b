// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Ingestion service binary.

use anyhow::Context;
use pulsestream::env_vars;
use pulsestream::producer::{EventProducer, ProducerConfig};
use pulsestream_ingestion::routes::{router, AppState};
use pulsestream_ingestion::{RequestRateLimiter, ValidationConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let producer =
        Arc::new(EventProducer::new(ProducerConfig::from_env()).context("producer creation failed")?);
    let state = AppState {
        producer,
        config: Arc::new(ValidationConfig::from_env()),
        limiter: Arc::new(RequestRateLimiter::from_env()),
    };
    let app = router(state);

    let host = env_vars::env_string_or_default(env_vars::INGESTION_HOST, "127.0.0.1");
    let port = env_vars::env_u16_or_default(env_vars::INGESTION_PORT, 8080);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .context("ingestion listener bind failed")?;
    info!(host = %host, port, "ingestion service listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("ingestion server failed")?;

    info!("ingestion service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
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
}
