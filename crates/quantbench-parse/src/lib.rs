pub mod artifact;
pub mod eval;
pub mod freetext;
pub mod jsonl;
pub mod summary;

pub use artifact::{classify, parse_artifact, parse_metadata, ArtifactKind, METADATA_KEYS};
pub use eval::parse_eval_output;
pub use jsonl::derived_throughput_gb_s;
pub use summary::{summarize, MetricSpread};
