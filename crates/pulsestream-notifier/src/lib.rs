// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # PulseStream Notification Service
//!
//! Consumes the alerts topic (group `notification.alerts`, manual
//! acknowledgement) and dispatches each alert through the enabled outbound
//! channels, after the throttler has had its say. Suppression is a terminal
//! decision: a suppressed alert is acknowledged, not retried.

/// Outbound notification channels.
pub mod channels;
/// Duplicate window and hourly rate limit.
pub mod throttle;

pub use channels::{channels_from_env, NotificationChannel};
pub use throttle::{Decision, SuppressReason, ThrottleConfig, Throttler};
