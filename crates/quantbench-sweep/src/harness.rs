use quantbench_core::{QuantBenchError, Result};
use tokio::process::Command;

/// Settings for one evaluation harness invocation against a serving
/// backend.
#[derive(Debug, Clone)]
pub struct EvalHarness {
    /// Program the harness runs under. Overridable so a stand-in can
    /// take the harness's place in lifecycle tests.
    pub program: String,
    pub environment: String,
    pub num_examples: u32,
    pub rollouts: u32,
    pub max_tokens: u32,
    pub max_concurrent: u32,
}

impl Default for EvalHarness {
    fn default() -> Self {
        Self {
            program: "uv".to_string(),
            environment: "gsm8k".to_string(),
            num_examples: 5,
            rollouts: 1,
            max_tokens: 512,
            max_concurrent: 1,
        }
    }
}

/// Captured result of a harness run.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl EvalHarness {
    fn command(&self, base_url: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["run", "vf-eval", &self.environment])
            .args(["-m", "local"])
            .args(["-b", base_url])
            .args(["-n", &self.num_examples.to_string()])
            .args(["-r", &self.rollouts.to_string()])
            .args(["-t", &self.max_tokens.to_string()])
            .args(["-c", &self.max_concurrent.to_string()])
            .arg("--save-results")
            // The endpoint is local and unauthenticated, but the
            // client refuses to start without a key.
            .env("OPENAI_API_KEY", "dummy")
            .kill_on_drop(true);
        cmd
    }

    /// Run the harness to completion and capture its output. The run
    /// is not bounded by a timeout; large models legitimately take a
    /// long time, and Ctrl-C remains the operator's escape hatch.
    pub async fn run(&self, base_url: &str) -> Result<EvalOutcome> {
        tracing::info!(
            "Running {} ({} examples, {} rollouts) against {}",
            self.environment,
            self.num_examples,
            self.rollouts,
            base_url
        );
        let output = self
            .command(base_url)
            .output()
            .await
            .map_err(|e| QuantBenchError::Process(format!("Failed to run harness: {}", e)))?;
        Ok(EvalOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_shape() {
        let harness = EvalHarness::default();
        let cmd = harness.command("http://localhost:7777/v1");
        assert_eq!(cmd.as_std().get_program(), "uv");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "run");
        assert_eq!(args[1], "vf-eval");
        assert_eq!(args[2], "gsm8k");
        let pos = args.iter().position(|a| a == "-b").unwrap();
        assert_eq!(args[pos + 1], "http://localhost:7777/v1");
        assert!(args.contains(&"--save-results".to_string()));
    }

    #[test]
    fn test_api_key_is_injected() {
        let harness = EvalHarness::default();
        let cmd = harness.command("http://localhost:7777/v1");
        let has_key = cmd
            .as_std()
            .get_envs()
            .any(|(k, v)| k == "OPENAI_API_KEY" && v == Some("dummy".as_ref()));
        assert!(has_key);
    }
}
