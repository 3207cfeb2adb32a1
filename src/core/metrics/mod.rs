pub mod histogram;
pub mod registry;

pub use histogram::LatencyHistogram;
pub use registry::{names, ComponentMetrics, HealthStatus, MetricSnapshot, MetricsRegistry};
