//! High-entropy string scanner for opaque secrets without a known shape.

use regex::Regex;

use super::RedactionMatch;
use crate::config::RedactionConfig;
use crate::error::{RedactionError, RedactionResult};

/// Specificity of entropy findings; any structural detector wins over them.
pub const ENTROPY_SPECIFICITY: u8 = 10;

/// Shannon entropy in bits per character.
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for b in s.bytes() {
        counts[b as usize] += 1;
    }
    let len = s.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

#[derive(Debug, Clone)]
pub struct EntropyScanner {
    candidate: Regex,
    base64_min_len: usize,
    base64_min_entropy: f64,
    hex_min_len: usize,
    hex_min_entropy: f64,
}

impl EntropyScanner {
    pub fn new(config: &RedactionConfig) -> RedactionResult<Self> {
        let min_len = config.base64_min_len.min(config.hex_min_len).max(1);
        let candidate = Regex::new(&format!(r"[A-Za-z0-9+/_\-]{{{min_len},}}={{0,2}}")).map_err(
            |e| RedactionError::InvalidPattern {
                kind: "high_entropy".to_string(),
                message: e.to_string(),
            },
        )?;
        Ok(Self {
            candidate,
            base64_min_len: config.base64_min_len,
            base64_min_entropy: config.base64_min_entropy,
            hex_min_len: config.hex_min_len,
            hex_min_entropy: config.hex_min_entropy,
        })
    }

    /// Classify a candidate token, returning the kind label if it looks secret.
    pub fn classify(&self, token: &str) -> Option<&'static str> {
        let body = token.trim_end_matches('=');
        if body.len() >= self.hex_min_len
            && body.bytes().all(|b| b.is_ascii_hexdigit())
            && shannon_entropy(body) >= self.hex_min_entropy
        {
            return Some("hex_high_entropy");
        }
        let mixed = body.bytes().any(|b| b.is_ascii_digit())
            && body.bytes().any(|b| b.is_ascii_uppercase())
            && body.bytes().any(|b| b.is_ascii_lowercase());
        if body.len() >= self.base64_min_len
            && mixed
            && shannon_entropy(body) >= self.base64_min_entropy
        {
            return Some("base64_high_entropy");
        }
        None
    }

    pub(crate) fn find_into(&self, text: &str, out: &mut Vec<RedactionMatch>) {
        for m in self.candidate.find_iter(text) {
            if let Some(kind) = self.classify(m.as_str()) {
                out.push(RedactionMatch {
                    kind: kind.to_string(),
                    span: m.range(),
                    specificity: ENTROPY_SPECIFICITY,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> EntropyScanner {
        EntropyScanner::new(&RedactionConfig::default()).expect("scanner")
    }

    #[test]
    fn test_entropy_bounds() {
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
        assert!((shannon_entropy("abcd") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_random_base64_is_flagged() {
        let token = "q8Zr4Tn0VbX2mK7pLw9sD3fH6jY1uE5cA0gRtN8z";
        assert_eq!(scanner().classify(token), Some("base64_high_entropy"));
    }

    #[test]
    fn test_hex_digest_is_flagged() {
        let token = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        assert_eq!(scanner().classify(token), Some("hex_high_entropy"));
    }

    #[test]
    fn test_ordinary_words_pass() {
        let s = scanner();
        assert_eq!(s.classify("TestSuiteForIntegrationRunner"), None);
        assert_eq!(s.classify("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"), None);
        assert_eq!(s.classify("short"), None);
    }

    #[test]
    fn test_find_into_reports_spans() {
        let text = "token q8Zr4Tn0VbX2mK7pLw9sD3fH6jY1uE5cA0gRtN8z end";
        let mut out = Vec::new();
        scanner().find_into(text, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(&text[out[0].span.clone()], "q8Zr4Tn0VbX2mK7pLw9sD3fH6jY1uE5cA0gRtN8z");
    }
}
