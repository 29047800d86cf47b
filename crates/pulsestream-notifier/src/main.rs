// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Notification service binary.
//!
//! Alert records are acknowledged after the dispatch *decision*, not after
//! delivery: channel sends are best-effort, and a suppressed alert is as
//! final as a delivered one. Malformed records advance with a log.

use anyhow::Context;
use axum::{routing::get, Router};
use futures::future::join_all;
use pulsestream::consumer::{create_stream_consumer, ConsumerConfig};
use pulsestream::env_vars;
use pulsestream::kafka::{Topics, GROUP_NOTIFICATION_ALERTS};
use pulsestream_notifier::{channels_from_env, Decision, ThrottleConfig, Throttler};
use rdkafka::consumer::{CommitMode, Consumer};
use rdkafka::message::Message;
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
    let throttler = Throttler::new(ThrottleConfig::from_env());
    let channels = channels_from_env();
    if channels.is_empty() {
        warn!("no notification channels configured; alerts will be consumed and dropped");
    }

    let consumer = create_stream_consumer(&ConsumerConfig::processing(
        topics.alerts.clone(),
        GROUP_NOTIFICATION_ALERTS,
    ))
    .context("consumer creation failed")?;

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    spawn_shutdown_listener(shutdown_tx.clone());
    spawn_health_listener(shutdown_tx.subscribe()).await?;

    info!(topic = %topics.alerts, group = GROUP_NOTIFICATION_ALERTS, "notifier started");

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
                            warn!(offset = msg.offset(), "record without payload; advancing");
                            commit(&consumer, &msg);
                            continue;
                        };
                        let alert = match pulsestream::codec::decode_alert(payload) {
                            Ok(alert) => alert,
                            Err(e) => {
                                warn!(offset = msg.offset(), error = %e, "malformed alert record; advancing");
                                commit(&consumer, &msg);
                                continue;
                            }
                        };

                        match throttler.check(&alert) {
                            Decision::Deliver => {
                                let sends = channels.iter().map(|channel| {
                                    let channel = channel.as_ref();
                                    let alert = &alert;
                                    async move {
                                        if let Err(e) = channel.notify(alert).await {
                                            warn!(channel = channel.name(), error = %e, "notification send failed");
                                        }
                                    }
                                });
                                join_all(sends).await;
                                info!(
                                    service = %alert.service_name,
                                    alert_type = %alert.alert_type,
                                    status = alert.status.as_str(),
                                    "alert dispatched"
                                );
                            }
                            Decision::Suppress(reason) => {
                                info!(
                                    service = %alert.service_name,
                                    alert_type = %alert.alert_type,
                                    reason = ?reason,
                                    "alert suppressed"
                                );
                            }
                        }
                        commit(&consumer, &msg);
                    }
                    Err(e) => {
                        warn!(error = %e, "consumer receive error; retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }

    info!("notifier stopped");
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
    let port = env_vars::env_u16_or_default(env_vars::NOTIFIER_HEALTH_PORT, 8083);
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
