// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # PulseStream Processing & Alert Service
//!
//! Drains the raw-metrics topic and runs every record through two
//! concurrent tracks:
//!
//! - **Aggregation** ([`aggregator::Aggregator`]): latest-value cache write
//!   plus history append; infallible by contract.
//! - **Alerting** ([`engine::AlertEngine`]): rule evaluation and the
//!   ACTIVE/NONE state machine over the shared cache.
//!
//! A record is acknowledged only after both tracks complete without error;
//! anything else leaves it uncommitted for redelivery. Redelivery is safe
//! because triggers are cache-guarded and resolves idempotent.

/// Latest-value caching and history persistence per metric.
pub mod aggregator;
/// Rule evaluation and the alert state machine.
pub mod engine;

pub use aggregator::{AggregationOutcome, Aggregator};
pub use engine::{AlertEngine, EngineReport};
