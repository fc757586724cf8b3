use quantbench_core::{MetricRow, RunMetadata};
use regex::Regex;

/// Payload fields recognized on a free-text engine log line.
#[derive(Debug, Default)]
struct Pending {
    enqueue_latency_ms: Option<f64>,
    total_latency_ms: Option<f64>,
    tokens_per_sec: Option<f64>,
    memory_throughput_gb_s: Option<f64>,
    param_throughput_gb_s: Option<f64>,
}

impl Pending {
    fn field_count(&self) -> usize {
        [
            self.enqueue_latency_ms.is_some(),
            self.total_latency_ms.is_some(),
            self.tokens_per_sec.is_some(),
            self.memory_throughput_gb_s.is_some(),
            self.param_throughput_gb_s.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// A step is complete once the total line arrived, or once fields
    /// from more than one payload line have accumulated.
    fn is_complete(&self) -> bool {
        self.total_latency_ms.is_some() || self.field_count() >= 2
    }
}

struct LinePatterns {
    enqueue: Regex,
    total: Regex,
}

impl LinePatterns {
    fn new() -> Self {
        Self {
            enqueue: Regex::new(r"enqueue in\s+(\d+\.?\d*)\s+ms").unwrap(),
            total: Regex::new(
                r"total\s+(\d+\.?\d*)\s+ms,\s+(\d+\.?\d*)\s+tok/s,\s+(\d+\.?\d*)\s+GB/s,\s+param\s+(\d+\.?\d*)\s+GB/s",
            )
            .unwrap(),
        }
    }

    fn scan(&self, line: &str, pending: &mut Pending) -> bool {
        let mut matched = false;
        if let Some(caps) = self.enqueue.captures(line) {
            pending.enqueue_latency_ms = caps[1].parse().ok();
            matched = true;
        }
        if let Some(caps) = self.total.captures(line) {
            pending.total_latency_ms = caps[1].parse().ok();
            pending.tokens_per_sec = caps[2].parse().ok();
            pending.memory_throughput_gb_s = caps[3].parse().ok();
            pending.param_throughput_gb_s = caps[4].parse().ok();
            matched = true;
        }
        matched
    }
}

/// Parse the free-text family: payload lines advance the step counter,
/// the closest preceding plain text line is the step's generated text,
/// everything unrecognized is skipped.
pub fn parse(text: &str, metadata: &RunMetadata) -> Vec<MetricRow> {
    let patterns = LinePatterns::new();
    let mut rows = Vec::new();
    let mut current_text = String::new();
    let mut step = 0u32;
    let mut pending = Pending::default();

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("seed")
            || line.starts_with("loaded weights")
            || line.starts_with("output validated")
        {
            continue;
        }
        if patterns.scan(line, &mut pending) {
            if pending.is_complete() {
                step += 1;
                let mut row = MetricRow::new(step, metadata.clone());
                row.generated_text = current_text.clone();
                row.enqueue_latency_ms = pending.enqueue_latency_ms;
                row.total_latency_ms = pending.total_latency_ms;
                row.tokens_per_sec = pending.tokens_per_sec;
                row.memory_throughput_gb_s = pending.memory_throughput_gb_s;
                row.param_throughput_gb_s = pending.param_throughput_gb_s;
                rows.push(row);
                pending = Pending::default();
            }
        } else if !line.is_empty()
            && !line.contains("enqueue in")
            && !line.contains("total")
            && !line.contains("ms")
        {
            current_text = line.to_string();
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::parse_artifact;

    const SAMPLE: &str = "\
platform: Linux
release: 6.8.0-45-generic
device: CUDA
username: bench
hostname: rig
size: 1B
quantize: int8
seed: 42
uuid: uuid1a2b3c4d
seed = 42
loaded weights in 1523.45 ms, 2.47 GB loaded at 1.62 GB/s
The capital of France is Paris.
enqueue in 4.25 ms
total 45.00 ms, 22.22 tok/s, 10.50 GB/s, param 5.25 GB/s
Photosynthesis converts light into energy.
enqueue in 3.10 ms
total 40.00 ms, 25.00 tok/s, 11.00 GB/s, param 5.50 GB/s
output validated
";

    #[test]
    fn test_parse_two_steps_with_text() {
        let rows = parse_artifact(SAMPLE);
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].step, 1);
        assert_eq!(rows[0].generated_text, "The capital of France is Paris.");
        assert_eq!(rows[0].enqueue_latency_ms, Some(4.25));
        assert_eq!(rows[0].total_latency_ms, Some(45.0));
        assert_eq!(rows[0].tokens_per_sec, Some(22.22));
        assert_eq!(rows[0].memory_throughput_gb_s, Some(10.5));
        assert_eq!(rows[0].param_throughput_gb_s, Some(5.25));

        assert_eq!(rows[1].step, 2);
        assert_eq!(
            rows[1].generated_text,
            "Photosynthesis converts light into energy."
        );
    }

    #[test]
    fn test_metadata_merged_into_every_row() {
        let rows = parse_artifact(SAMPLE);
        for row in &rows {
            assert_eq!(row.metadata.hostname, "rig");
            assert_eq!(row.metadata.quantize, "int8");
            assert_eq!(row.metadata.uuid, "uuid1a2b3c4d");
        }
        assert_eq!(rows[0].metadata, rows[1].metadata);
    }

    #[test]
    fn test_single_line_payload() {
        let text = "total 45.00 ms, 22.22 tok/s, 10.50 GB/s, param 5.25 GB/s\n";
        let rows = parse_artifact(text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].enqueue_latency_ms, None);
        assert_eq!(rows[0].total_latency_ms, Some(45.0));
    }

    #[test]
    fn test_unrecognized_lines_are_skipped() {
        let text = "random noise\n=== banner ===\n";
        assert!(parse_artifact(text).is_empty());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let first = parse_artifact(SAMPLE);
        let second = parse_artifact(SAMPLE);
        assert_eq!(first, second);
    }
}
