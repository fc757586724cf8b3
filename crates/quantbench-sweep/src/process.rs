use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quantbench_core::{QuantBenchError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Rolling cap on captured process output kept for post-mortem use.
const OUTPUT_TAIL: usize = 8192;

/// Owns one spawned external process. Output is drained continuously
/// so the child never blocks on a full pipe; termination is two-phase
/// (graceful signal, bounded wait, forceful kill). `kill_on_drop` is
/// the backstop if the handle is dropped without a shutdown.
pub struct ProcessHandle {
    name: String,
    child: Child,
    output: Arc<Mutex<String>>,
}

impl ProcessHandle {
    pub fn spawn(name: &str, mut cmd: Command) -> Result<Self> {
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| QuantBenchError::Process(format!("Failed to spawn {}: {}", name, e)))?;

        let output = Arc::new(Mutex::new(String::new()));
        if let Some(stdout) = child.stdout.take() {
            Self::drain(stdout, output.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            Self::drain(stderr, output.clone());
        }

        tracing::info!("Spawned {} (pid {:?})", name, child.id());
        Ok(Self {
            name: name.to_string(),
            child,
            output,
        })
    }

    fn drain<R>(reader: R, sink: Arc<Mutex<String>>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut out = sink.lock().unwrap();
                out.push_str(&line);
                out.push('\n');
                if out.len() > OUTPUT_TAIL {
                    let cut = out.len() - OUTPUT_TAIL;
                    let keep = out
                        .char_indices()
                        .find(|(i, _)| *i >= cut)
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    out.drain(..keep);
                }
            }
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Most recent captured stdout/stderr of the child.
    pub fn output_tail(&self) -> String {
        self.output.lock().unwrap().clone()
    }

    /// Graceful terminate, wait up to `grace`, then kill.
    pub async fn shutdown(mut self, grace: Duration) {
        self.request_terminate();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => tracing::info!("{} exited with {}", self.name, status),
            Ok(Err(e)) => tracing::warn!("Waiting for {} failed: {}", self.name, e),
            Err(_) => {
                tracing::warn!("{} still running after {:?}, killing", self.name, grace);
                if let Err(e) = self.child.kill().await {
                    tracing::warn!("Failed to kill {}: {}", self.name, e);
                }
            }
        }
    }

    #[cfg(unix)]
    fn request_terminate(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!("Failed to signal {}: {}", self.name, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn request_terminate(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let cmd = Command::new("definitely-not-a-real-binary-2f9a");
        assert!(ProcessHandle::spawn("ghost", cmd).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_captured() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello-from-child"]);
        let handle = ProcessHandle::spawn("echoer", cmd).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(handle.output_tail().contains("hello-from-child"));
        handle.shutdown(Duration::from_secs(1)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_graceful_shutdown_of_long_runner() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let handle = ProcessHandle::spawn("sleeper", cmd).unwrap();

        let start = std::time::Instant::now();
        handle.shutdown(Duration::from_secs(2)).await;
        // SIGTERM ends sleep immediately, well before the grace bound.
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stubborn_process_is_killed() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "trap '' TERM; sleep 30"]);
        let handle = ProcessHandle::spawn("stubborn", cmd).unwrap();
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let start = std::time::Instant::now();
        handle.shutdown(Duration::from_millis(500)).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_secs(5));
    }
}
