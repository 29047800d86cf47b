// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # PulseStream Ingestion Service
//!
//! The HTTP boundary of the pipeline. Client agents POST metric samples;
//! anything that survives validation is published to the raw-metrics topic
//! keyed by service name, and nothing that fails validation ever enters the
//! core.

/// Per-IP ingress rate limiting.
pub mod rate_limit;
/// HTTP routes and response envelopes.
pub mod routes;
/// The inbound validation contract.
pub mod validate;

pub use rate_limit::RequestRateLimiter;
pub use routes::AppState;
pub use validate::{MetricSubmission, ValidationConfig};
