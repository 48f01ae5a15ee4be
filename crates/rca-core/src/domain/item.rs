//! Failure items: the units of analysis input.
//!
//! Collectors produce owned [`StepRef`], [`TestRef`] and [`ArtifactRef`]
//! values. The core only ever borrows them: a [`FailureItem`] holds
//! references into the collector's data for the duration of one run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tokens::estimate_tokens;

/// Kind of a failure item. Declaration order is the Report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Step,
    Test,
    ArtifactBatch,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Test => "test",
            Self::ArtifactBatch => "artifact_batch",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a failure item: kind first, then identifier.
///
/// The derived `Ord` is the canonical processing and Report order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub kind: ItemKind,
    pub id: String,
}

impl ItemKey {
    pub fn new(kind: ItemKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn step(id: impl Into<String>) -> Self {
        Self::new(ItemKind::Step, id)
    }

    pub fn test(id: impl Into<String>) -> Self {
        Self::new(ItemKind::Test, id)
    }

    pub fn batch(id: impl Into<String>) -> Self {
        Self::new(ItemKind::ArtifactBatch, id)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A failed pipeline step as delivered by a collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    pub name: String,
    /// Condensed log text.
    pub log: String,
    /// Upstream steps this step depends on, from the step graph.
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub size_tokens: u64,
}

impl StepRef {
    pub fn new(name: impl Into<String>, log: impl Into<String>) -> Self {
        let log = log.into();
        Self {
            name: name.into(),
            size_tokens: estimate_tokens(&log),
            log,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// A failed test case as delivered by a collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRef {
    /// `Class.name` or bare `name`.
    pub identifier: String,
    pub source_file: Option<String>,
    pub failure_type: Option<String>,
    pub failure_message: Option<String>,
    /// Combined failure content, stdout and stderr.
    pub details: String,
    pub size_tokens: u64,
}

impl TestRef {
    pub fn new(identifier: impl Into<String>, details: impl Into<String>) -> Self {
        let details = details.into();
        Self {
            identifier: identifier.into(),
            source_file: None,
            failure_type: None,
            failure_message: None,
            size_tokens: estimate_tokens(&details),
            details,
        }
    }

    pub fn with_failure(mut self, failure_type: impl Into<String>, message: impl Into<String>) -> Self {
        self.failure_type = Some(failure_type.into());
        self.failure_message = Some(message.into());
        self
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }
}

/// A text-eligible supplementary artifact. Binary content never gets here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: String,
    pub content: String,
    pub size_tokens: u64,
}

impl ArtifactRef {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size_tokens: estimate_tokens(&content),
            content,
        }
    }
}

/// One artifact placed in a batch, possibly cut down to the batch ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMember<'a> {
    pub artifact: &'a ArtifactRef,
    /// Tokens this member contributes to the batch.
    pub size_tokens: u64,
    pub truncated: bool,
}

/// A group of artifacts analysed in a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBatch<'a> {
    pub id: String,
    pub members: Vec<BatchMember<'a>>,
}

impl ArtifactBatch<'_> {
    pub fn size_tokens(&self) -> u64 {
        self.members.iter().map(|m| m.size_tokens).sum()
    }

    pub fn truncated_paths(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| m.truncated)
            .map(|m| m.artifact.path.clone())
            .collect()
    }
}

/// One unit of analysis input, borrowed from the collector for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureItem<'a> {
    Step(&'a StepRef),
    Test(&'a TestRef),
    ArtifactBatch(ArtifactBatch<'a>),
}

impl FailureItem<'_> {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Step(_) => ItemKind::Step,
            Self::Test(_) => ItemKind::Test,
            Self::ArtifactBatch(_) => ItemKind::ArtifactBatch,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Step(step) => &step.name,
            Self::Test(test) => &test.identifier,
            Self::ArtifactBatch(batch) => &batch.id,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.kind(), self.id())
    }

    pub fn size_tokens(&self) -> u64 {
        match self {
            Self::Step(step) => step.size_tokens,
            Self::Test(test) => test.size_tokens,
            Self::ArtifactBatch(batch) => batch.size_tokens(),
        }
    }
}
