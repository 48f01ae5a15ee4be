//! Per-item analysis results.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::item::{ItemKey, ItemKind};

/// Failure category reported by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Infrastructure,
    Test,
    Build,
    Configuration,
    Timeout,
    Unknown,
}

impl FailureCategory {
    /// Lenient parse: anything unrecognised is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "infrastructure" | "infra" => Self::Infrastructure,
            "test" => Self::Test,
            "build" => Self::Build,
            "configuration" | "config" => Self::Configuration,
            "timeout" => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::Test => "test",
            Self::Build => "build",
            Self::Configuration => "configuration",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log excerpt backing a root-cause claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub source: String,
    pub content: String,
}

/// What the model found for one artifact inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFinding {
    pub path: String,
    pub key_findings: String,
}

/// Kind-specific part of a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingDetail {
    Step { dependencies: Vec<String> },
    Test { source_file: Option<String> },
    ArtifactBatch { artifacts: Vec<ArtifactFinding> },
}

impl FindingDetail {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Step { .. } => ItemKind::Step,
            Self::Test { .. } => ItemKind::Test,
            Self::ArtifactBatch { .. } => ItemKind::ArtifactBatch,
        }
    }
}

/// A well-formed model answer for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: FailureCategory,
    pub root_cause: String,
    pub evidence: Vec<Evidence>,
    pub detail: FindingDetail,
}

/// Why an item has no finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    Transport { attempts: u32, message: String },
    MalformedResponse { message: String },
    TimedOut,
    RedactionFailure { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { attempts, message } => {
                write!(f, "transport error after {attempts} attempt(s): {message}")
            }
            Self::MalformedResponse { message } => write!(f, "malformed response: {message}"),
            Self::TimedOut => f.write_str("timed out"),
            Self::RedactionFailure { message } => {
                write!(f, "response withheld, redaction failed: {message}")
            }
        }
    }
}

/// Terminal status of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisStatus {
    Succeeded { finding: Finding },
    Failed { reason: FailureReason },
    /// Dropped before analysis; the budget could not grant the floor.
    ExcludedForBudget,
}

/// Outcome for one failure item, linked back to it by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub key: ItemKey,
    pub status: AnalysisStatus,
    /// Identifiers whose content was cut to fit the allocation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub truncated: Vec<String>,
}

impl AnalysisResult {
    pub fn succeeded(key: ItemKey, finding: Finding) -> Self {
        Self {
            key,
            status: AnalysisStatus::Succeeded { finding },
            truncated: Vec::new(),
        }
    }

    pub fn failed(key: ItemKey, reason: FailureReason) -> Self {
        Self {
            key,
            status: AnalysisStatus::Failed { reason },
            truncated: Vec::new(),
        }
    }

    pub fn excluded(key: ItemKey) -> Self {
        Self {
            key,
            status: AnalysisStatus::ExcludedForBudget,
            truncated: Vec::new(),
        }
    }

    pub fn with_truncated(mut self, truncated: Vec<String>) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn finding(&self) -> Option<&Finding> {
        match &self.status {
            AnalysisStatus::Succeeded { finding } => Some(finding),
            _ => None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.status, AnalysisStatus::Succeeded { .. })
    }
}
