use quantbench_core::{EvalMetrics, RewardStat};

/// Scan evaluation harness output for reward lines of the form
/// `label: avg - X, std - Y` and the elapsed-time sentence. Lines that
/// match neither are ignored; a missing metric is omitted, not an
/// error.
pub fn parse_eval_output(output: &str) -> EvalMetrics {
    let mut metrics = EvalMetrics::default();

    for line in output.lines() {
        if line.contains("avg -") && line.contains("std -") {
            if let Some((name, stat)) = parse_reward_line(line) {
                metrics.rewards.insert(name, stat);
            }
        }
        if line.contains("Evaluation completed in") {
            if let Some(seconds) = parse_elapsed_sentence(line) {
                metrics.eval_time_seconds = Some(seconds);
            }
        }
    }
    metrics
}

fn parse_reward_line(line: &str) -> Option<(String, RewardStat)> {
    let (name, _) = line.split_once(':')?;
    let avg = line
        .split("avg -")
        .nth(1)?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()?;
    let std = line
        .split("std -")
        .nth(1)?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()?;
    Some((name.trim().to_string(), RewardStat { avg, std }))
}

fn parse_elapsed_sentence(line: &str) -> Option<f64> {
    line.split("in")
        .nth(1)?
        .split("seconds")
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reward_lines() {
        let output = "\
Starting evaluation...
reward: avg - 0.812, std - 0.134
format_reward_func: avg - 1.000, std - 0.000
Evaluation completed in 73.4 seconds
";
        let metrics = parse_eval_output(output);
        assert_eq!(metrics.rewards.len(), 2);
        assert_eq!(metrics.rewards["reward"].avg, 0.812);
        assert_eq!(metrics.rewards["reward"].std, 0.134);
        assert_eq!(metrics.rewards["format_reward_func"].avg, 1.0);
        assert_eq!(metrics.eval_time_seconds, Some(73.4));
    }

    #[test]
    fn test_missing_lines_are_omitted() {
        let metrics = parse_eval_output("nothing to see here\n");
        assert!(metrics.is_empty());
    }

    #[test]
    fn test_malformed_reward_line_is_skipped() {
        let metrics = parse_eval_output("reward: avg - oops, std - 0.1\n");
        assert!(metrics.rewards.is_empty());
    }
}
