pub mod backend;
pub mod controller;
pub mod harness;
pub mod probe;
pub mod process;
pub mod record;
pub mod runner;

pub use backend::{BackendKind, BackendPaths};
pub use controller::{SweepController, SweepOptions, SweepReport};
pub use harness::{EvalHarness, EvalOutcome};
pub use probe::wait_ready;
pub use process::ProcessHandle;
pub use record::{write_records, RunRecord, RunStatus};
pub use runner::BenchRunner;
