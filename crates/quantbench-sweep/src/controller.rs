use std::path::PathBuf;
use std::time::{Duration, Instant};

use quantbench_core::{Result, RunConfig, SweepAxes};
use quantbench_parse::parse_eval_output;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendKind, BackendPaths};
use crate::harness::EvalHarness;
use crate::probe::wait_ready;
use crate::process::ProcessHandle;
use crate::record::{tail, write_records, RunRecord, RunStatus};

/// Characters of stdout/stderr kept in a failed run's record.
const OUTPUT_TAIL_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub backend: BackendKind,
    pub axes: SweepAxes,
    pub harness: EvalHarness,
    pub backend_port: u16,
    pub proxy_port: u16,
    pub output_dir: PathBuf,
    pub paths: BackendPaths,
    pub ready_timeout: Duration,
    pub proxy_ready_timeout: Duration,
    pub settle_pause: Duration,
    pub backend_grace: Duration,
    pub proxy_grace: Duration,
}

impl SweepOptions {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            axes: SweepAxes::default(),
            harness: EvalHarness::default(),
            backend_port: 7776,
            proxy_port: 7777,
            output_dir: PathBuf::from("./results"),
            paths: BackendPaths::default(),
            ready_timeout: Duration::from_secs(180),
            proxy_ready_timeout: Duration::from_secs(10),
            settle_pause: Duration::from_secs(2),
            backend_grace: Duration::from_secs(10),
            proxy_grace: Duration::from_secs(5),
        }
    }
}

/// Where the sweep's results landed and what they contain.
pub struct SweepReport {
    pub path: PathBuf,
    pub records: Vec<RunRecord>,
}

/// Drives the full sweep: one backend server per configuration,
/// readiness gating, the evaluation harness, teardown, and the results
/// file. Cancellation (Ctrl-C) stops cleanly between or within runs;
/// records gathered so far are still written.
pub struct SweepController {
    opts: SweepOptions,
    cancel: CancellationToken,
}

impl SweepController {
    pub fn new(opts: SweepOptions) -> Self {
        Self {
            opts,
            cancel: CancellationToken::new(),
        }
    }

    /// Token a signal handler can trip to stop the sweep.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<SweepReport> {
        // Axis validation is fatal before anything is spawned.
        self.opts.axes.validate_against(
            self.opts.backend.available_sizes(),
            self.opts.backend.available_quantizations(),
        )?;

        let configs = self.opts.axes.configurations();
        tracing::info!(
            "Sweeping {} configurations on {}",
            configs.len(),
            self.opts.backend.name()
        );

        let mut records = Vec::with_capacity(configs.len());
        for (i, config) in configs.iter().enumerate() {
            // An interrupt between runs must not start another backend
            // just to tear it down.
            if self.cancel.is_cancelled() {
                tracing::warn!("Sweep interrupted, skipping {}", config);
                break;
            }
            tracing::info!("[{}/{}] {}", i + 1, configs.len(), config);
            let record = self.run_one(config).await;
            let interrupted = record.status == RunStatus::Interrupted;
            records.push(record);
            if interrupted {
                tracing::warn!("Sweep interrupted, stopping");
                break;
            }
            // Let sockets close and memory settle before the next
            // server comes up on the same port.
            if i + 1 < configs.len() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.opts.settle_pause) => {}
                }
            }
        }

        let size_label = self
            .opts
            .axes
            .sizes
            .first()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());
        let path = write_records(
            &self.opts.output_dir,
            &self.opts.harness.environment,
            &size_label,
            &records,
        )?;
        Ok(SweepReport { path, records })
    }

    /// One configuration end to end. Teardown always runs, in reverse
    /// spawn order, whatever happened in between.
    async fn run_one(&self, config: &RunConfig) -> RunRecord {
        let started = Instant::now();
        let mut record = RunRecord::new(
            self.opts.backend.name(),
            config,
            &self.opts.harness.environment,
            self.opts.harness.num_examples,
            self.opts.harness.max_tokens,
            RunStatus::Completed,
        );

        let mut procs: Vec<ProcessHandle> = Vec::new();
        self.drive(config, &mut record, &mut procs).await;

        while let Some(proc) = procs.pop() {
            let grace = if proc.name() == "proxy" {
                self.opts.proxy_grace
            } else {
                self.opts.backend_grace
            };
            tracing::info!("Stopping {}", proc.name());
            proc.shutdown(grace).await;
        }

        record.elapsed_seconds = started.elapsed().as_secs_f64();
        record
    }

    async fn drive(
        &self,
        config: &RunConfig,
        record: &mut RunRecord,
        procs: &mut Vec<ProcessHandle>,
    ) {
        let cmd = self
            .opts
            .backend
            .server_command(config, self.opts.backend_port, &self.opts.paths);
        let server = match ProcessHandle::spawn(self.opts.backend.name(), cmd) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("{}", e);
                record.status = RunStatus::SpawnFailed;
                record.stderr = e.to_string();
                return;
            }
        };
        procs.push(server);

        let ready = tokio::select! {
            _ = self.cancel.cancelled() => {
                record.status = RunStatus::Interrupted;
                return;
            }
            ready = wait_ready(self.opts.backend_port, self.opts.ready_timeout) => ready,
        };
        if !ready {
            tracing::error!(
                "{} not ready on port {} after {:?}",
                self.opts.backend.name(),
                self.opts.backend_port,
                self.opts.ready_timeout
            );
            record.status = RunStatus::ReadyTimeout;
            record.stdout = tail(&procs[0].output_tail(), OUTPUT_TAIL_CHARS);
            return;
        }

        let eval_port = if self.opts.backend.needs_proxy() {
            if !self.start_proxy(record, procs).await {
                return;
            }
            self.opts.proxy_port
        } else {
            self.opts.backend_port
        };

        let base_url = format!("http://localhost:{}/v1", eval_port);
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => {
                record.status = RunStatus::Interrupted;
                return;
            }
            outcome = self.opts.harness.run(&base_url) => outcome,
        };

        match outcome {
            Ok(outcome) => {
                let combined = format!("{}\n{}", outcome.stdout, outcome.stderr);
                record.metrics = parse_eval_output(&combined);
                record.returncode = outcome.exit_code;
                record.stdout = tail(&outcome.stdout, OUTPUT_TAIL_CHARS);
                record.stderr = tail(&outcome.stderr, OUTPUT_TAIL_CHARS);
                if record.metrics.is_empty() {
                    tracing::warn!("No metrics recognized in harness output for {}", config);
                }
            }
            Err(e) => {
                tracing::error!("{}", e);
                record.status = RunStatus::SpawnFailed;
                record.stderr = e.to_string();
            }
        }
    }

    /// Spawn the buffering proxy as a child of this binary and wait
    /// for it to listen. Returns false when the run cannot proceed.
    async fn start_proxy(&self, record: &mut RunRecord, procs: &mut Vec<ProcessHandle>) -> bool {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                record.status = RunStatus::SpawnFailed;
                record.stderr = format!("Cannot locate own executable: {}", e);
                return false;
            }
        };
        let mut cmd = Command::new(exe);
        cmd.arg("proxy")
            .args(["--backend-port", &self.opts.backend_port.to_string()])
            .args(["--port", &self.opts.proxy_port.to_string()]);
        let proxy = match ProcessHandle::spawn("proxy", cmd) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("{}", e);
                record.status = RunStatus::SpawnFailed;
                record.stderr = e.to_string();
                return false;
            }
        };
        procs.push(proxy);

        let ready = tokio::select! {
            _ = self.cancel.cancelled() => {
                record.status = RunStatus::Interrupted;
                return false;
            }
            ready = wait_ready(self.opts.proxy_port, self.opts.proxy_ready_timeout) => ready,
        };
        if !ready {
            tracing::error!("Proxy not ready on port {}", self.opts.proxy_port);
            record.status = RunStatus::ProxyReadyTimeout;
            return false;
        }
        true
    }
}
