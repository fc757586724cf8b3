use quantbench_core::{MetricRow, RunMetadata};

use crate::freetext;
use crate::jsonl;

/// Metadata keys recognized in the `key: value` header of a raw
/// artifact. Anything else is payload or noise.
pub const METADATA_KEYS: &[&str] = &[
    "platform", "release", "device", "username", "hostname", "size", "quantize", "seed", "uuid",
];

/// The two raw artifact families. Classified once for the whole
/// artifact, then dispatched to the matching parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Engine log with free-text payload lines (tinygrad family).
    FreeText,
    /// Line-delimited JSON records (llama-bench family).
    JsonLines,
}

/// An artifact containing at least one line that parses as a JSON
/// object is a JSONL artifact; everything else is free text.
pub fn classify(text: &str) -> ArtifactKind {
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('{')
            && serde_json::from_str::<serde_json::Value>(line)
                .map(|v| v.is_object())
                .unwrap_or(false)
        {
            return ArtifactKind::JsonLines;
        }
    }
    ArtifactKind::FreeText
}

/// Collect the metadata header. Unknown keys and non-header lines are
/// ignored; missing keys stay empty so the merged schema is stable.
pub fn parse_metadata(text: &str) -> RunMetadata {
    let mut meta = RunMetadata::default();
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('{') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "platform" => meta.platform = value.to_string(),
            "release" => meta.release = value.to_string(),
            "device" => meta.device = value.to_string(),
            "username" => meta.username = value.to_string(),
            "hostname" => meta.hostname = value.to_string(),
            "size" => meta.size = value.to_string(),
            "quantize" => meta.quantize = value.to_string(),
            "seed" => meta.seed = value.to_string(),
            "uuid" => meta.uuid = value.to_string(),
            _ => {}
        }
    }
    meta
}

/// Normalize one raw artifact into canonical metric rows.
pub fn parse_artifact(text: &str) -> Vec<MetricRow> {
    let metadata = parse_metadata(text);
    let kind = classify(text);
    tracing::debug!(?kind, uuid = %metadata.uuid, "Parsing artifact");
    match kind {
        ArtifactKind::FreeText => freetext::parse(text, &metadata),
        ArtifactKind::JsonLines => jsonl::parse(text, &metadata),
    }
}
