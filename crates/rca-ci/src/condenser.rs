//! Tail-preserving log condenser.

use rca_core::{estimate_tokens, truncate_to_tokens, Preprocessor};
use tracing::debug;

/// Marker placed before the preserved final lines.
pub const FINAL_OUTPUT_MARKER: &str = "--- FINAL OUTPUT ---";

const SIGNAL_WORDS: &[&str] = &[
    "error", "fail", "panic", "exception", "fatal", "timeout", "timed out",
];

/// Condenses logs over a token target to their error-looking lines plus the
/// final lines of output, which usually hold the failure.
#[derive(Debug, Clone)]
pub struct TailCondenser {
    target_tokens: u64,
    last_lines: usize,
}

impl TailCondenser {
    pub fn new(target_tokens: u64) -> Self {
        Self {
            target_tokens: target_tokens.max(1),
            last_lines: 15,
        }
    }

    pub fn with_last_lines(mut self, last_lines: usize) -> Self {
        self.last_lines = last_lines;
        self
    }

    pub fn target_tokens(&self) -> u64 {
        self.target_tokens
    }
}

fn is_signal(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    SIGNAL_WORDS.iter().any(|w| lower.contains(w))
}

impl Preprocessor for TailCondenser {
    fn condense(&self, raw: &str, device_hint: Option<&str>) -> String {
        let before = estimate_tokens(raw);
        if before <= self.target_tokens {
            return raw.to_string();
        }

        let lines: Vec<&str> = raw.lines().collect();
        let split = lines.len().saturating_sub(self.last_lines);
        let (body, tail) = lines.split_at(split);

        let mut condensed = body
            .iter()
            .filter(|line| is_signal(line))
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        if !tail.is_empty() {
            if !condensed.is_empty() {
                condensed.push_str("\n\n");
            }
            condensed.push_str(FINAL_OUTPUT_MARKER);
            condensed.push('\n');
            condensed.push_str(&tail.join("\n"));
        }

        let (condensed, _) = truncate_to_tokens(&condensed, self.target_tokens);
        debug!(
            before,
            after = estimate_tokens(&condensed),
            device = device_hint.unwrap_or("cpu"),
            "condensed log"
        );
        condensed.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_logs_pass_through() {
        let condenser = TailCondenser::new(1_000);
        let raw = "step 1\nstep 2\n";
        assert_eq!(condenser.condense(raw, None), raw);
    }

    #[test]
    fn test_large_logs_keep_errors_and_tail() {
        let mut raw = String::new();
        for i in 0..400 {
            raw.push_str(&format!("info: progress line {i}\n"));
            if i == 100 {
                raw.push_str("ERROR: image pull backoff for registry.local/app\n");
            }
        }
        let condenser = TailCondenser::new(200).with_last_lines(3);
        let out = condenser.condense(&raw, Some("cpu"));

        assert!(out.contains("ERROR: image pull backoff"));
        assert!(out.contains(FINAL_OUTPUT_MARKER));
        assert!(out.ends_with("info: progress line 399"));
        assert!(!out.contains("progress line 50\n"));
        assert!(estimate_tokens(&out) <= 200);
    }
}
