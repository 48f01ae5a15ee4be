//! Domain model: failure items and their analysis results.

pub mod item;
pub mod result;

pub use item::{
    ArtifactBatch, ArtifactRef, BatchMember, FailureItem, ItemKey, ItemKind, StepRef, TestRef,
};
pub use result::{
    AnalysisResult, AnalysisStatus, ArtifactFinding, Evidence, FailureCategory, FailureReason,
    Finding, FindingDetail,
};
