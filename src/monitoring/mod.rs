pub mod logging;
pub mod metrics;

pub use metrics::{CountingMetrics, MetricsSink, NoopMetrics, RpcOutcome};
