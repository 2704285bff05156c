//! Device telemetry.

pub mod metrics;

pub use metrics::{DeviceMetrics, MetricsSnapshot};
