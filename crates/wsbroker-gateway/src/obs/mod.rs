//! In-process metrics.
//!
//! Series are stored as atomics and rendered by the ops `/metrics` handler in
//! Prometheus text format.

pub mod metrics;

pub use metrics::BrokerMetrics;
