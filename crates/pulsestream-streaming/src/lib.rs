// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # PulseStream Streaming Service
//!
//! Fans live metrics and alerts out to SSE dashboards. One shared hot
//! stream per topic (consumer groups `streaming.metrics` /
//! `streaming.alerts`, offset-reset latest) multicasts into per-subscriber
//! bounded queues with an overflow policy, so a slow browser never blocks
//! the upstream or its neighbors. A periodic latest-value reader scans the
//! cache for overview streams.

/// Shared fan-out: upstream pumps, subscriber queues, overflow policies.
pub mod hub;
/// Periodic latest-value snapshots from the cache.
pub mod latest;
/// SSE routes.
pub mod routes;

pub use hub::{HubConfig, OverflowPolicy, StreamHub, Subscription};
pub use routes::AppState;
