//! Structural secret detectors.
//!
//! Detectors are plain data: a kind label, a regex, and a specificity used to
//! settle overlaps. When a pattern has a `secret` capture group only that
//! group is replaced, so context such as a connection string's host survives.

use regex::Regex;

use super::RedactionMatch;
use crate::error::{RedactionError, RedactionResult};

/// Static description of a structural detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectorSpec {
    pub kind: &'static str,
    pub pattern: &'static str,
    pub specificity: u8,
}

/// Built-in detectors, most specific first.
pub const BUILTIN_DETECTORS: &[DetectorSpec] = &[
    DetectorSpec {
        kind: "private_key",
        pattern: r"(?s)-----BEGIN[A-Z0-9 ]*PRIVATE KEY-----.*?(?:-----END[A-Z0-9 ]*PRIVATE KEY-----|\z)",
        specificity: 100,
    },
    DetectorSpec {
        kind: "aws_access_key",
        pattern: r"\b(?:AKIA|ASIA|AGPA|AIDA|AROA|AIPA|ANPA|ANVA)[A-Z0-9]{16}\b",
        specificity: 90,
    },
    DetectorSpec {
        kind: "github_token",
        pattern: r"\b(?:gh[pousr]_[A-Za-z0-9]{36,255}|github_pat_[A-Za-z0-9_]{22,255})\b",
        specificity: 90,
    },
    DetectorSpec {
        kind: "slack_token",
        pattern: r"\bxox[abposr]-[A-Za-z0-9-]{10,}",
        specificity: 90,
    },
    DetectorSpec {
        kind: "aws_secret_key",
        pattern: r#"(?i)aws_?secret_?access_?key["']?\s*[:=]\s*["']?(?P<secret>[A-Za-z0-9/+=]{40})"#,
        specificity: 85,
    },
    DetectorSpec {
        kind: "jwt",
        pattern: r"\beyJ[A-Za-z0-9_-]{5,}\.eyJ[A-Za-z0-9_-]{5,}\.[A-Za-z0-9_-]{10,}",
        specificity: 80,
    },
    DetectorSpec {
        kind: "connection_string",
        pattern: r"(?i)\b(?:postgres(?:ql)?|mysql|mariadb|mongodb(?:\+srv)?|rediss?|amqps?|mssql|sqlserver)://[^\s:/@]+:(?P<secret>[^\s@/]+)@",
        specificity: 70,
    },
    DetectorSpec {
        kind: "basic_auth_url",
        pattern: r"(?i)\b(?:https?|ftp|git|ssh)://[^\s:/@]+:(?P<secret>[^\s@/]+)@",
        specificity: 70,
    },
    DetectorSpec {
        kind: "bearer_token",
        pattern: r"(?i)\bbearer\s+(?P<secret>[A-Za-z0-9\-._~+/]{16,}=*)",
        specificity: 60,
    },
    DetectorSpec {
        kind: "keyword_assignment",
        pattern: r#"(?i)\b[a-z0-9_]*(?:password|passwd|secret|token|api_?key|access_?key|private_?key)[a-z0-9_]*["']?\s*[:=]\s*["']?(?P<secret>[^\s"',;]{8,})"#,
        specificity: 50,
    },
];

/// A compiled detector.
#[derive(Debug, Clone)]
pub struct Detector {
    kind: String,
    regex: Regex,
    specificity: u8,
}

impl Detector {
    /// Compile a detector. Kind labels must be lowercase snake case so that
    /// placeholders stay recognisable.
    pub fn new(kind: &str, pattern: &str, specificity: u8) -> RedactionResult<Self> {
        let valid_kind = !kind.is_empty()
            && kind
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid_kind {
            return Err(RedactionError::InvalidPattern {
                kind: kind.to_string(),
                message: "kind must be lowercase snake case".to_string(),
            });
        }
        let regex = Regex::new(pattern).map_err(|e| RedactionError::InvalidPattern {
            kind: kind.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            kind: kind.to_string(),
            regex,
            specificity,
        })
    }

    pub fn from_spec(spec: &DetectorSpec) -> RedactionResult<Self> {
        Self::new(spec.kind, spec.pattern, spec.specificity)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub(crate) fn find_into(&self, text: &str, out: &mut Vec<RedactionMatch>) {
        for caps in self.regex.captures_iter(text) {
            let Some(m) = caps.name("secret").or_else(|| caps.get(0)) else {
                continue;
            };
            if m.is_empty() {
                continue;
            }
            out.push(RedactionMatch {
                kind: self.kind.clone(),
                span: m.range(),
                specificity: self.specificity,
            });
        }
    }
}

/// Compile every built-in detector.
pub fn builtin() -> RedactionResult<Vec<Detector>> {
    BUILTIN_DETECTORS.iter().map(Detector::from_spec).collect()
}
