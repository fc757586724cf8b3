use std::path::{Path, PathBuf};
use std::str::FromStr;

use quantbench_core::{
    ModelSize, QuantBenchError, Quantization, Result, RunConfig, AVAILABLE_QUANTS, AVAILABLE_SIZES,
};
use tokio::process::Command;

/// Inference backends the sweep knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// llama.cpp: `llama-server` speaks the OpenAI API natively.
    LlamaCpp,
    /// tinygrad: the example server only streams, so its runs go
    /// through the buffering proxy.
    Tinygrad,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::LlamaCpp => "llamacpp",
            BackendKind::Tinygrad => "tinygrad",
        }
    }

    /// Whether evaluation traffic must be routed through the
    /// streaming-compatibility proxy instead of hitting the backend
    /// directly.
    pub fn needs_proxy(&self) -> bool {
        matches!(self, BackendKind::Tinygrad)
    }

    pub fn available_sizes(&self) -> &'static [ModelSize] {
        AVAILABLE_SIZES
    }

    pub fn available_quantizations(&self) -> &'static [Quantization] {
        AVAILABLE_QUANTS
    }

    /// Command that serves `config` on `port`.
    pub fn server_command(&self, config: &RunConfig, port: u16, paths: &BackendPaths) -> Command {
        match self {
            BackendKind::LlamaCpp => {
                let mut cmd = Command::new(&paths.llama_server_bin);
                cmd.arg("-m")
                    .arg(paths.model_path(config))
                    .args(["--host", "0.0.0.0"])
                    .args(["--port", &port.to_string()]);
                cmd
            }
            BackendKind::Tinygrad => {
                let mut cmd = Command::new("python");
                cmd.arg(paths.tinygrad_root.join("examples/llama3.py"))
                    .args(["--size", config.size.as_str()])
                    .args(["--port", &port.to_string()]);
                if let Some(flag) = config.quantize.flag_value() {
                    cmd.args(["--quantize", flag]);
                }
                cmd.args(["--seed", &config.seed.to_string()]);
                cmd.env("PYTHONPATH", &paths.tinygrad_root);
                cmd
            }
        }
    }

    /// Command for one offline benchmark run whose stdout becomes the
    /// raw artifact body.
    pub fn bench_command(&self, config: &RunConfig, paths: &BackendPaths) -> Command {
        match self {
            BackendKind::LlamaCpp => {
                let mut cmd = Command::new(&paths.llama_bench_bin);
                cmd.arg("-m")
                    .arg(paths.model_path(config))
                    .args(["-p", "0"])
                    .args(["-n", "20"])
                    .args(["-r", "5"])
                    .args(["-o", "jsonl"]);
                cmd
            }
            BackendKind::Tinygrad => {
                let mut cmd = Command::new("python");
                cmd.arg(paths.tinygrad_root.join("examples/llama3.py"))
                    .args(["--size", config.size.as_str()])
                    .arg("--benchmark");
                if let Some(flag) = config.quantize.flag_value() {
                    cmd.args(["--quantize", flag]);
                }
                cmd.args(["--seed", &config.seed.to_string()]);
                cmd.env("PYTHONPATH", &paths.tinygrad_root);
                cmd
            }
        }
    }
}

impl FromStr for BackendKind {
    type Err = QuantBenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "llamacpp" => Ok(BackendKind::LlamaCpp),
            "tinygrad" => Ok(BackendKind::Tinygrad),
            other => Err(QuantBenchError::Config(format!(
                "Unknown backend: {} (expected llamacpp or tinygrad)",
                other
            ))),
        }
    }
}

/// Filesystem locations of backend binaries and model weights.
#[derive(Debug, Clone)]
pub struct BackendPaths {
    pub llama_server_bin: PathBuf,
    pub llama_bench_bin: PathBuf,
    pub model_dir: PathBuf,
    pub tinygrad_root: PathBuf,
}

impl Default for BackendPaths {
    fn default() -> Self {
        Self {
            llama_server_bin: PathBuf::from("./deps/llama.cpp/build/bin/llama-server"),
            llama_bench_bin: PathBuf::from("./deps/llama.cpp/build/bin/llama-bench"),
            model_dir: PathBuf::from("./models"),
            tinygrad_root: PathBuf::from("./deps/tinygrad"),
        }
    }
}

impl BackendPaths {
    /// Pre-quantized GGUF weights for one sweep point. Quantization is
    /// baked into the file, so each mode maps to its own file.
    pub fn model_path(&self, config: &RunConfig) -> PathBuf {
        self.model_dir.join(format!(
            "Llama-3.2-{}-Instruct-{}.gguf",
            config.size,
            config.quantize.gguf_suffix()
        ))
    }

    pub fn with_model_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.model_dir = dir.as_ref().to_path_buf();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(quantize: Quantization) -> RunConfig {
        RunConfig {
            size: ModelSize::B1,
            quantize,
            seed: 42,
        }
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("llamacpp".parse::<BackendKind>().unwrap(), BackendKind::LlamaCpp);
        assert_eq!("tinygrad".parse::<BackendKind>().unwrap(), BackendKind::Tinygrad);
        assert!("vllm".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_only_tinygrad_needs_proxy() {
        assert!(BackendKind::Tinygrad.needs_proxy());
        assert!(!BackendKind::LlamaCpp.needs_proxy());
    }

    #[test]
    fn test_model_path_per_quantization() {
        let paths = BackendPaths::default();
        let p = paths.model_path(&config(Quantization::Nf4));
        assert!(p.to_string_lossy().ends_with("Llama-3.2-1B-Instruct-Q4_K_M.gguf"));
        let p = paths.model_path(&config(Quantization::Default));
        assert!(p.to_string_lossy().ends_with("Llama-3.2-1B-Instruct-Q6_K.gguf"));
    }

    #[test]
    fn test_default_quantization_passes_no_flag() {
        let paths = BackendPaths::default();
        let cmd = BackendKind::Tinygrad.server_command(&config(Quantization::Default), 7776, &paths);
        let args = args_of(&cmd);
        assert!(!args.iter().any(|a| a == "--quantize"));
        assert!(args.contains(&"--seed".to_string()));
    }

    #[test]
    fn test_int8_quantization_passes_flag() {
        let paths = BackendPaths::default();
        let cmd = BackendKind::Tinygrad.server_command(&config(Quantization::Int8), 7776, &paths);
        let args = args_of(&cmd);
        let pos = args.iter().position(|a| a == "--quantize").unwrap();
        assert_eq!(args[pos + 1], "int8");
    }

    #[test]
    fn test_llamacpp_server_command_binds_port() {
        let paths = BackendPaths::default();
        let cmd = BackendKind::LlamaCpp.server_command(&config(Quantization::Int8), 7780, &paths);
        let args = args_of(&cmd);
        let pos = args.iter().position(|a| a == "--port").unwrap();
        assert_eq!(args[pos + 1], "7780");
    }

    #[test]
    fn test_llamacpp_bench_emits_jsonl() {
        let paths = BackendPaths::default();
        let cmd = BackendKind::LlamaCpp.bench_command(&config(Quantization::Default), &paths);
        let args = args_of(&cmd);
        let pos = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[pos + 1], "jsonl");
    }
}
