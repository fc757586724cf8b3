use std::collections::BTreeMap;

use quantbench_core::MetricRow;
use serde::Serialize;

/// Spread of one canonical metric across the data rows of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSpread {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

fn spread(mut values: Vec<f64>) -> Option<MetricSpread> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let sum: f64 = values.iter().sum();
    Some(MetricSpread {
        min: values[0],
        max: values[values.len() - 1],
        mean: sum / values.len() as f64,
        median: values[values.len() / 2],
    })
}

/// Per-metric summary statistics over an artifact's data rows. The
/// step-0 summary row is excluded so aggregates only cover real steps.
pub fn summarize(rows: &[MetricRow]) -> BTreeMap<String, MetricSpread> {
    let data: Vec<&MetricRow> = rows.iter().filter(|r| !r.is_summary()).collect();
    let metrics: [(&str, fn(&MetricRow) -> Option<f64>); 5] = [
        ("enqueue_latency_ms", |r| r.enqueue_latency_ms),
        ("total_latency_ms", |r| r.total_latency_ms),
        ("tokens_per_sec", |r| r.tokens_per_sec),
        ("memory_throughput_gb_s", |r| r.memory_throughput_gb_s),
        ("param_throughput_gb_s", |r| r.param_throughput_gb_s),
    ];

    let mut summary = BTreeMap::new();
    for (name, get) in metrics {
        let values: Vec<f64> = data.iter().filter_map(|r| get(r)).collect();
        if let Some(s) = spread(values) {
            summary.insert(name.to_string(), s);
        }
    }
    summary
}
