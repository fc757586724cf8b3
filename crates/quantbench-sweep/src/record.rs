use std::path::{Path, PathBuf};

use quantbench_core::{EvalMetrics, QuantBenchError, Result, RunConfig};
use serde::{Deserialize, Serialize};

/// How far into its lifecycle one sweep run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    ReadyTimeout,
    ProxyReadyTimeout,
    SpawnFailed,
    Interrupted,
}

/// Everything recorded about one run, completed or not. Failed and
/// interrupted runs keep their output tails for diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub quantization: String,
    pub size: String,
    pub seed: u64,
    pub environment: String,
    pub num_examples: u32,
    pub max_tokens: u32,
    pub backend: String,
    pub status: RunStatus,
    #[serde(flatten)]
    pub metrics: EvalMetrics,
    pub elapsed_seconds: f64,
    pub returncode: Option<i32>,
    pub timestamp: String,
    pub stdout: String,
    pub stderr: String,
}

impl RunRecord {
    pub fn new(
        backend: &str,
        config: &RunConfig,
        environment: &str,
        num_examples: u32,
        max_tokens: u32,
        status: RunStatus,
    ) -> Self {
        Self {
            quantization: config.quantize.to_string(),
            size: config.size.to_string(),
            seed: config.seed,
            environment: environment.to_string(),
            num_examples,
            max_tokens,
            backend: backend.to_string(),
            status,
            metrics: EvalMetrics::default(),
            elapsed_seconds: 0.0,
            returncode: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Last `n` characters of a captured output stream.
pub fn tail(s: &str, n: usize) -> String {
    if s.len() <= n {
        return s.to_string();
    }
    let cut = s.len() - n;
    let start = s
        .char_indices()
        .find(|(i, _)| *i >= cut)
        .map(|(i, _)| i)
        .unwrap_or(0);
    s[start..].to_string()
}

/// Write the sweep's records as one pretty-printed JSON file named
/// `sweep_{environment}_{size}_{timestamp}.json`. The write goes
/// through a temp file in the same directory so a crash never leaves
/// a half-written results file.
pub fn write_records(
    dir: &Path,
    environment: &str,
    size_label: &str,
    records: &[RunRecord],
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = format!(
        "sweep_{}_{}_{}.json",
        environment,
        size_label,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(&name);

    let file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(file.as_file(), records)?;
    file.persist(&path)
        .map_err(|e| QuantBenchError::Io(e.error))?;
    tracing::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantbench_core::{ModelSize, Quantization};

    fn sample_record(status: RunStatus) -> RunRecord {
        let config = RunConfig {
            size: ModelSize::B1,
            quantize: Quantization::Int8,
            seed: 42,
        };
        RunRecord::new("tinygrad", &config, "gsm8k", 5, 512, status)
    }

    #[test]
    fn test_tail_bounds() {
        assert_eq!(tail("short", 1000), "short");
        let long = "x".repeat(1500);
        assert_eq!(tail(&long, 1000).len(), 1000);
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        let s = "é".repeat(600);
        let t = tail(&s, 1000);
        assert!(t.len() <= 1000);
        assert!(t.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let record = sample_record(RunStatus::ReadyTimeout);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "ready_timeout");
    }

    #[test]
    fn test_write_records_creates_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![sample_record(RunStatus::Completed)];
        let path = write_records(dir.path(), "gsm8k", "1B", &records).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("sweep_gsm8k_1B_"));
        assert!(name.ends_with(".json"));

        let body: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(body[0]["quantization"], "int8");
        assert_eq!(body[0]["backend"], "tinygrad");
    }

    #[test]
    fn test_rewards_flatten_into_record() {
        let mut record = sample_record(RunStatus::Completed);
        record.metrics.rewards.insert(
            "reward".to_string(),
            quantbench_core::RewardStat { avg: 0.8, std: 0.1 },
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["reward"]["avg"], 0.8);
    }
}
