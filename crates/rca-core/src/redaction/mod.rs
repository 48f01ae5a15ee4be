//! Secret redaction at every text exit point.
//!
//! [`RedactionGate`] combines the structural [`detectors`] with the
//! [`entropy`] scanner. Findings are replaced by `[REDACTED:<kind>]`
//! placeholders. Placeholders never match a detector, which makes redaction
//! idempotent.
//!
//! Text that has passed the gate is wrapped in [`RedactedText`]; sinks only
//! accept that type.

pub mod detectors;
pub mod entropy;

use std::fmt;
use std::ops::Range;

use regex::Regex;

use crate::config::RedactionConfig;
use crate::error::{RedactionError, RedactionResult};
use detectors::Detector;
use entropy::EntropyScanner;

/// Rescans allowed before a stubborn match is reported as residual.
const MAX_PASSES: usize = 3;

const PLACEHOLDER_PATTERN: &str = r"\[REDACTED:[a-z0-9_]+\]";

/// One detected secret. Holds a span, never the secret itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionMatch {
    pub kind: String,
    pub span: Range<usize>,
    pub specificity: u8,
}

/// Text that has been through a [`RedactionGate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactedText(String);

impl RedactedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for RedactedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RedactedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of [`RedactionGate::redact`].
#[derive(Debug, Clone)]
pub struct Redaction {
    pub text: RedactedText,
    /// Spans refer to the text as it stood in the pass that found them; in
    /// practice every match comes from the first pass over the input.
    pub matches: Vec<RedactionMatch>,
}

/// Format the placeholder for a detector kind.
pub fn placeholder(kind: &str) -> String {
    format!("[REDACTED:{kind}]")
}

#[derive(Debug, Clone)]
pub struct RedactionGate {
    detectors: Vec<Detector>,
    entropy: EntropyScanner,
    placeholders: Regex,
    max_scan_bytes: usize,
}

impl RedactionGate {
    /// Gate with the built-in detectors and the given thresholds.
    pub fn new(config: &RedactionConfig) -> RedactionResult<Self> {
        let placeholders =
            Regex::new(PLACEHOLDER_PATTERN).map_err(|e| RedactionError::InvalidPattern {
                kind: "placeholder".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            detectors: detectors::builtin()?,
            entropy: EntropyScanner::new(config)?,
            placeholders,
            max_scan_bytes: config.max_scan_bytes,
        })
    }

    /// Register an extra structural detector.
    pub fn add_detector(&mut self, kind: &str, pattern: &str, specificity: u8) -> RedactionResult<()> {
        self.detectors.push(Detector::new(kind, pattern, specificity)?);
        Ok(())
    }

    pub fn detector_kinds(&self) -> impl Iterator<Item = &str> {
        self.detectors.iter().map(Detector::kind)
    }

    /// Replace every detected secret in `text` with a labelled placeholder.
    ///
    /// Fails with [`RedactionError::InputTooLarge`] for oversize input and
    /// [`RedactionError::Residual`] when a detector still matches after
    /// rewriting; callers must withhold the text in both cases.
    pub fn redact(&self, text: &str) -> RedactionResult<Redaction> {
        if text.len() > self.max_scan_bytes {
            return Err(RedactionError::InputTooLarge {
                len: text.len(),
                limit: self.max_scan_bytes,
            });
        }

        let mut current = text.to_string();
        let mut all_matches = Vec::new();
        for _ in 0..MAX_PASSES {
            let matches = self.scan(&current);
            if matches.is_empty() {
                return Ok(Redaction {
                    text: RedactedText(current),
                    matches: all_matches,
                });
            }
            current = rewrite(&current, &matches);
            all_matches.extend(matches);
        }

        match self.scan(&current).into_iter().next() {
            Some(residual) => Err(RedactionError::Residual {
                kind: residual.kind,
            }),
            None => Ok(Redaction {
                text: RedactedText(current),
                matches: all_matches,
            }),
        }
    }

    /// Convenience wrapper returning only the cleaned text.
    pub fn clean(&self, text: &str) -> RedactionResult<RedactedText> {
        self.redact(text).map(|r| r.text)
    }

    /// Find non-overlapping secret spans, sorted by position.
    ///
    /// Matches touching an existing placeholder are ignored. Overlaps are
    /// settled by specificity, then earliest start, then longest span.
    pub fn scan(&self, text: &str) -> Vec<RedactionMatch> {
        let protected: Vec<Range<usize>> =
            self.placeholders.find_iter(text).map(|m| m.range()).collect();

        let mut found = Vec::new();
        for detector in &self.detectors {
            detector.find_into(text, &mut found);
        }
        self.entropy.find_into(text, &mut found);
        found.retain(|m| !protected.iter().any(|p| overlaps(p, &m.span)));

        found.sort_by(|a, b| {
            b.specificity
                .cmp(&a.specificity)
                .then(a.span.start.cmp(&b.span.start))
                .then(b.span.len().cmp(&a.span.len()))
        });
        let mut accepted: Vec<RedactionMatch> = Vec::new();
        for m in found {
            if !accepted.iter().any(|a| overlaps(&a.span, &m.span)) {
                accepted.push(m);
            }
        }
        accepted.sort_by_key(|m| m.span.start);
        accepted
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn rewrite(text: &str, matches: &[RedactionMatch]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for m in matches {
        out.push_str(&text[cursor..m.span.start]);
        out.push_str(&placeholder(&m.kind));
        cursor = m.span.end;
    }
    out.push_str(&text[cursor..]);
    out
}
