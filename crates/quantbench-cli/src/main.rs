use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use quantbench_core::{ModelSize, Quantization, SweepAxes};
use quantbench_parse::{parse_artifact, summarize};
use quantbench_proxy::{DEFAULT_BACKEND_PORT, DEFAULT_PROXY_PORT};
use quantbench_sweep::{BackendKind, BenchRunner, SweepController, SweepOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quantbench")]
#[command(about = "Quantization benchmark sweeps for local LLM backends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an evaluation sweep over a quantization/size/seed grid
    Sweep {
        /// Backend to drive (llamacpp, tinygrad)
        #[arg(short, long, default_value = "tinygrad")]
        backend: String,

        /// Model sizes (comma-separated: 1B, 8B, 70B, 405B)
        #[arg(long, value_delimiter = ',', default_value = "1B")]
        sizes: Vec<String>,

        /// Quantization modes (comma-separated: default, int8, nf4, float16)
        #[arg(short, long, value_delimiter = ',', default_value = "default,int8,nf4,float16")]
        quantizations: Vec<String>,

        /// Random seeds (comma-separated)
        #[arg(long, value_delimiter = ',', default_value = "42")]
        seeds: Vec<u64>,

        /// Evaluation environment
        #[arg(short, long, default_value = "gsm8k")]
        environment: String,

        /// Number of examples per run
        #[arg(short, long, default_value = "5")]
        num_examples: u32,

        /// Rollouts per example
        #[arg(short, long, default_value = "1")]
        rollouts: u32,

        /// Max tokens per completion
        #[arg(long, default_value = "512")]
        max_tokens: u32,

        /// Max concurrent requests from the harness
        #[arg(short, long, default_value = "1")]
        concurrency: u32,

        /// Port the backend server listens on
        #[arg(long, default_value_t = DEFAULT_BACKEND_PORT)]
        backend_port: u16,

        /// Port the buffering proxy listens on
        #[arg(long, default_value_t = DEFAULT_PROXY_PORT)]
        proxy_port: u16,

        /// Directory for the results JSON
        #[arg(short, long, default_value = "./results")]
        output: PathBuf,

        /// Directory holding GGUF model files
        #[arg(long, default_value = "./models")]
        model_dir: PathBuf,

        /// Seconds to wait for the backend to start serving
        #[arg(long, default_value = "180")]
        ready_timeout: u64,
    },

    /// Run the streaming-compatibility proxy on its own
    Proxy {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PROXY_PORT)]
        port: u16,

        /// Port of the streaming backend to forward to
        #[arg(long, default_value_t = DEFAULT_BACKEND_PORT)]
        backend_port: u16,
    },

    /// Run offline benchmarks and write raw artifacts
    Bench {
        /// Backend to drive (llamacpp, tinygrad)
        #[arg(short, long, default_value = "llamacpp")]
        backend: String,

        /// Model sizes (comma-separated)
        #[arg(long, value_delimiter = ',', default_value = "1B")]
        sizes: Vec<String>,

        /// Quantization modes (comma-separated)
        #[arg(short, long, value_delimiter = ',', default_value = "default,int8,nf4,float16")]
        quantizations: Vec<String>,

        /// Random seeds (comma-separated)
        #[arg(long, value_delimiter = ',', default_value = "42")]
        seeds: Vec<u64>,

        /// Device label recorded in artifact metadata
        #[arg(short, long, default_value = "unknown")]
        device: String,

        /// Directory for raw artifact files
        #[arg(short, long, default_value = "./artifacts")]
        output: PathBuf,

        /// Directory holding GGUF model files
        #[arg(long, default_value = "./models")]
        model_dir: PathBuf,
    },

    /// Parse raw benchmark artifacts into canonical metric rows
    Parse {
        /// Artifact files to parse
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print per-metric summary statistics instead of rows
        #[arg(short, long)]
        summary: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sweep {
            backend,
            sizes,
            quantizations,
            seeds,
            environment,
            num_examples,
            rollouts,
            max_tokens,
            concurrency,
            backend_port,
            proxy_port,
            output,
            model_dir,
            ready_timeout,
        } => {
            let mut opts = SweepOptions::new(backend.parse::<BackendKind>()?);
            opts.axes = parse_axes(&sizes, &quantizations, seeds)?;
            opts.harness.environment = environment;
            opts.harness.num_examples = num_examples;
            opts.harness.rollouts = rollouts;
            opts.harness.max_tokens = max_tokens;
            opts.harness.max_concurrent = concurrency;
            opts.backend_port = backend_port;
            opts.proxy_port = proxy_port;
            opts.output_dir = output;
            opts.paths = opts.paths.with_model_dir(model_dir);
            opts.ready_timeout = std::time::Duration::from_secs(ready_timeout);
            cmd_sweep(opts).await?;
        }
        Commands::Proxy { port, backend_port } => {
            let backend_url = format!("http://localhost:{}", backend_port);
            quantbench_proxy::serve(port, backend_url).await?;
        }
        Commands::Bench {
            backend,
            sizes,
            quantizations,
            seeds,
            device,
            output,
            model_dir,
        } => {
            let mut runner = BenchRunner::new(backend.parse::<BackendKind>()?);
            runner.axes = parse_axes(&sizes, &quantizations, seeds)?;
            runner.device = device;
            runner.output_dir = output;
            runner.paths = runner.paths.with_model_dir(model_dir);
            let written = runner.run().await?;
            println!("Wrote {} artifact(s)", written.len());
        }
        Commands::Parse { files, summary } => cmd_parse(&files, summary)?,
    }

    Ok(())
}

fn parse_axes(sizes: &[String], quantizations: &[String], seeds: Vec<u64>) -> Result<SweepAxes> {
    Ok(SweepAxes {
        sizes: sizes
            .iter()
            .map(|s| s.parse::<ModelSize>())
            .collect::<quantbench_core::Result<_>>()?,
        quantizations: quantizations
            .iter()
            .map(|q| q.parse::<Quantization>())
            .collect::<quantbench_core::Result<_>>()?,
        seeds,
    })
}

async fn cmd_sweep(opts: SweepOptions) -> Result<()> {
    let controller = SweepController::new(opts);

    // First Ctrl-C asks the sweep to stop; it still tears processes
    // down and writes the records gathered so far.
    let cancel = controller.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping sweep");
            cancel.cancel();
        }
    });

    let report = controller.run().await?;

    println!();
    println!("Sweep Results:");
    println!("{:-<72}", "");
    println!(
        "  {:<10} {:<6} {:<6} {:<16} {:>10}",
        "quant", "size", "seed", "status", "elapsed"
    );
    println!("{:-<72}", "");
    for record in &report.records {
        println!(
            "  {:<10} {:<6} {:<6} {:<16} {:>9.1}s",
            record.quantization,
            record.size,
            record.seed,
            serde_json::to_value(record.status)?
                .as_str()
                .unwrap_or("?")
                .to_string(),
            record.elapsed_seconds,
        );
        for (name, stat) in &record.metrics.rewards {
            println!("      {}: avg {:.3}, std {:.3}", name, stat.avg, stat.std);
        }
    }
    println!();
    println!("  Results file: {}", report.path.display());
    println!();

    Ok(())
}

fn cmd_parse(files: &[PathBuf], summary: bool) -> Result<()> {
    for file in files {
        let text = std::fs::read_to_string(file)?;
        let rows = parse_artifact(&text);
        tracing::info!("{}: {} rows", file.display(), rows.len());

        if summary {
            println!();
            println!("{}:", file.display());
            println!("{:-<72}", "");
            println!(
                "  {:<26} {:>10} {:>10} {:>10} {:>10}",
                "metric", "min", "max", "mean", "median"
            );
            for (name, spread) in summarize(&rows) {
                println!(
                    "  {:<26} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
                    name, spread.min, spread.max, spread.mean, spread.median
                );
            }
        } else {
            for row in &rows {
                println!("{}", serde_json::to_string(row)?);
            }
        }
    }
    Ok(())
}
