use std::path::PathBuf;

use quantbench_core::{HostInfo, Result, RunMetadata, SweepAxes};

use crate::backend::{BackendKind, BackendPaths};

/// Offline benchmark runner: no server, no harness. Each configuration
/// runs the backend's bench command once and its stdout lands in a raw
/// artifact file under `output_dir`, prefixed with the metadata header
/// the extraction pipeline reads back.
pub struct BenchRunner {
    pub backend: BackendKind,
    pub axes: SweepAxes,
    pub device: String,
    pub output_dir: PathBuf,
    pub paths: BackendPaths,
}

impl BenchRunner {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            axes: SweepAxes::default(),
            device: "unknown".to_string(),
            output_dir: PathBuf::from("./artifacts"),
            paths: BackendPaths::default(),
        }
    }

    /// Run the whole grid. A failed run keeps its header-only artifact
    /// and the sweep continues; the returned paths cover successful
    /// runs only.
    pub async fn run(&self) -> Result<Vec<PathBuf>> {
        self.axes.validate_against(
            self.backend.available_sizes(),
            self.backend.available_quantizations(),
        )?;
        std::fs::create_dir_all(&self.output_dir)?;

        let host = HostInfo::capture();
        let configs = self.axes.configurations();
        let mut written = Vec::new();

        for (i, config) in configs.iter().enumerate() {
            tracing::info!("[{}/{}] Benchmarking {}", i + 1, configs.len(), config);
            let metadata = RunMetadata::new(&host, &self.device, config);
            let path = self.output_dir.join(format!(
                "{}_{}",
                self.backend.name(),
                metadata.artifact_file_name()
            ));

            let mut body = String::new();
            for (key, value) in metadata.header_lines() {
                body.push_str(key);
                body.push_str(": ");
                body.push_str(value);
                body.push('\n');
            }

            match self.backend.bench_command(config, &self.paths).output().await {
                Ok(output) if output.status.success() => {
                    body.push_str(&String::from_utf8_lossy(&output.stdout));
                    std::fs::write(&path, &body)?;
                    tracing::info!("Wrote {}", path.display());
                    written.push(path);
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    tracing::error!("Benchmark for {} failed: {}", config, stderr.trim());
                    body.push_str(&String::from_utf8_lossy(&output.stdout));
                    if !stderr.is_empty() {
                        body.push_str("STDERR:\n");
                        body.push_str(&stderr);
                    }
                    std::fs::write(&path, &body)?;
                }
                Err(e) => {
                    tracing::error!("Benchmark for {} did not start: {}", config, e);
                    std::fs::write(&path, &body)?;
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantbench_core::{ModelSize, Quantization};

    #[tokio::test]
    async fn test_failed_bench_leaves_header_only_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = BenchRunner::new(BackendKind::LlamaCpp);
        runner.output_dir = dir.path().to_path_buf();
        runner.paths.llama_bench_bin = PathBuf::from("/nonexistent/llama-bench");
        runner.axes = SweepAxes {
            sizes: vec![ModelSize::B1],
            quantizations: vec![Quantization::Int8],
            seeds: vec![7],
        };

        let written = runner.run().await.unwrap();
        assert!(written.is_empty());

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let path = entries[0].as_ref().unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("llamacpp_"));
        assert!(name.contains("_1B_int8_seed7_"));

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("size: 1B"));
        assert!(body.contains("quantize: int8"));
    }

    #[tokio::test]
    async fn test_successful_bench_appends_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = BenchRunner::new(BackendKind::LlamaCpp);
        runner.output_dir = dir.path().to_path_buf();
        // Any binary that exits 0 and prints stands in for the bench.
        runner.paths.llama_bench_bin = PathBuf::from("/bin/echo");
        runner.axes = SweepAxes {
            sizes: vec![ModelSize::B1],
            quantizations: vec![Quantization::Default],
            seeds: vec![42],
        };

        let written = runner.run().await.unwrap();
        assert_eq!(written.len(), 1);
        let body = std::fs::read_to_string(&written[0]).unwrap();
        assert!(body.contains("uuid: uuid"));
        // echo printed its arguments after the header.
        assert!(body.contains("-o jsonl\n") || body.contains("jsonl"));
    }
}
