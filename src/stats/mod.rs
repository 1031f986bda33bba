//! Process-wide statistics

pub mod metrics;

pub use metrics::{MetricsSnapshot, RelayMetrics};
