use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::metadata::RunMetadata;

/// The canonical schema every parsed benchmark artifact is normalized
/// into, regardless of backend. Fields a given backend cannot report
/// stay `None`/empty rather than disappearing, so grouping code never
/// special-cases the source family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    /// Monotonic step within the run; 0 is reserved for the run-level
    /// summary row.
    pub step: u32,
    pub enqueue_latency_ms: Option<f64>,
    pub total_latency_ms: Option<f64>,
    pub tokens_per_sec: Option<f64>,
    pub memory_throughput_gb_s: Option<f64>,
    pub param_throughput_gb_s: Option<f64>,
    pub generated_text: String,
    #[serde(flatten)]
    pub metadata: RunMetadata,
    /// Backend-specific fields (build id, thread count, GPU string,
    /// ...). Preserved but outside the comparability contract.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl MetricRow {
    pub fn new(step: u32, metadata: RunMetadata) -> Self {
        Self {
            step,
            enqueue_latency_ms: None,
            total_latency_ms: None,
            tokens_per_sec: None,
            memory_throughput_gb_s: None,
            param_throughput_gb_s: None,
            generated_text: String::new(),
            metadata,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_summary(&self) -> bool {
        self.step == 0
    }
}

/// One reward line from the evaluation harness output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardStat {
    pub avg: f64,
    pub std: f64,
}

/// Metrics recognized in the evaluation harness output. Rewards the
/// harness did not print are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    #[serde(flatten)]
    pub rewards: BTreeMap<String, RewardStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_time_seconds: Option<f64>,
}

impl EvalMetrics {
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty() && self.eval_time_seconds.is_none()
    }
}
