// Domain modules
pub mod config;
pub mod error;
pub mod metadata;
pub mod metrics;

pub use config::{
    ModelSize, Quantization, RunConfig, SweepAxes, AVAILABLE_QUANTS, AVAILABLE_SIZES,
};
pub use error::{QuantBenchError, Result};
pub use metadata::{HostInfo, RunMetadata};
pub use metrics::{EvalMetrics, MetricRow, RewardStat};
