use quantbench_core::{MetricRow, RunMetadata};
use serde::Deserialize;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const NS_PER_MS: f64 = 1_000_000.0;
const NS_PER_S: f64 = 1_000_000_000.0;

/// One llama-bench JSONL record: aggregate stats over several
/// repetitions plus the per-repetition sample arrays.
#[derive(Debug, Deserialize)]
struct BenchRecord {
    #[serde(default)]
    samples_ns: Vec<f64>,
    #[serde(default)]
    samples_ts: Vec<f64>,
    #[serde(default = "default_n_gen")]
    n_gen: u64,
    #[serde(default)]
    model_size: u64,
    #[serde(default)]
    model_n_params: u64,
    #[serde(default)]
    avg_ns: f64,
    #[serde(default)]
    avg_ts: f64,
    #[serde(default)]
    stddev_ts: f64,
    #[serde(default)]
    build_commit: String,
    #[serde(default)]
    model_type: String,
    #[serde(default)]
    n_batch: Option<i64>,
    #[serde(default)]
    n_threads: Option<i64>,
    #[serde(default)]
    gpu_info: String,
    #[serde(default)]
    backends: String,
}

fn default_n_gen() -> u64 {
    20
}

/// `(bytes / 2^30) * tokens / elapsed`, with a zero result instead of
/// a division error when no time elapsed.
pub fn derived_throughput_gb_s(quantity_bytes: u64, tokens_generated: u64, elapsed_s: f64) -> f64 {
    if elapsed_s > 0.0 {
        (quantity_bytes as f64 / GIB) * tokens_generated as f64 / elapsed_s
    } else {
        0.0
    }
}

impl BenchRecord {
    fn extras(&self) -> Vec<(&'static str, String)> {
        vec![
            ("build_commit", self.build_commit.clone()),
            ("model_type", self.model_type.clone()),
            ("n_gen", self.n_gen.to_string()),
            ("n_batch", self.n_batch.map(|v| v.to_string()).unwrap_or_default()),
            ("n_threads", self.n_threads.map(|v| v.to_string()).unwrap_or_default()),
            ("gpu_info", self.gpu_info.clone()),
            ("backends", self.backends.clone()),
        ]
    }

    /// Summary row first (step 0, aggregate folded into the text
    /// field), then one row per paired sample entry.
    fn into_rows(self, metadata: &RunMetadata) -> Vec<MetricRow> {
        let extras = self.extras();
        let mut rows = Vec::with_capacity(self.samples_ns.len() + 1);

        let mut summary = MetricRow::new(0, metadata.clone());
        summary.total_latency_ms = Some(self.avg_ns / NS_PER_MS);
        summary.tokens_per_sec = Some(self.avg_ts);
        summary.generated_text = format!("avg (stddev: {:.2} tok/s)", self.stddev_ts);
        for (key, value) in &extras {
            summary.extra.insert((*key).to_string(), value.clone());
        }
        rows.push(summary);

        // The engine reports parameter count; assume fp16 storage.
        let param_bytes = self.model_n_params * 2;

        for (step, (ns, ts)) in self
            .samples_ns
            .iter()
            .zip(self.samples_ts.iter())
            .enumerate()
        {
            let elapsed_s = ns / NS_PER_S;
            let mut row = MetricRow::new(step as u32 + 1, metadata.clone());
            row.total_latency_ms = Some(ns / NS_PER_MS);
            row.tokens_per_sec = Some(*ts);
            row.memory_throughput_gb_s =
                Some(derived_throughput_gb_s(self.model_size, self.n_gen, elapsed_s));
            row.param_throughput_gb_s =
                Some(derived_throughput_gb_s(param_bytes, self.n_gen, elapsed_s));
            for (key, value) in &extras {
                row.extra.insert((*key).to_string(), value.clone());
            }
            rows.push(row);
        }
        rows
    }
}

/// Parse the JSONL family: every line that deserializes as a bench
/// record contributes a summary row plus its per-sample rows; other
/// lines are skipped.
pub fn parse(text: &str, metadata: &RunMetadata) -> Vec<MetricRow> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        match serde_json::from_str::<BenchRecord>(line) {
            Ok(record) => rows.extend(record.into_rows(metadata)),
            Err(e) => tracing::debug!("Skipping malformed JSONL line: {}", e),
        }
    }
    rows
}
