//! ci-rca Core Library
//!
//! Budgeted, redacted root-cause analysis of CI failures. Failure items
//! (steps, tests, artifact batches) share a fixed context window, are
//! analysed in bounded parallel, and are merged into one ordered report.
//! Every text that leaves the process passes the [`RedactionGate`].

pub mod batcher;
pub mod budget;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod models;
pub mod obs;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod redaction;
pub mod report;
pub mod response;
pub mod synthesis;
pub mod telemetry;
pub mod tokens;
pub mod transport;

pub use batcher::batch_artifacts;
pub use budget::{allocate, Allocation, Budget};
pub use collaborators::{deliver, CollectedJob, Collector, Delivery, Preprocessor, ReportFormat, Sink};
pub use config::{
    AnalysisConfig, BudgetConfig, ConcurrencyConfig, PerKind, RedactionConfig, RetryPolicy,
};
pub use domain::{
    AnalysisResult, AnalysisStatus, ArtifactBatch, ArtifactFinding, ArtifactRef, BatchMember,
    Evidence, FailureCategory, FailureItem, FailureReason, Finding, FindingDetail, ItemKey,
    ItemKind, StepRef, TestRef,
};
pub use error::{
    CollectorError, CollectorResult, ConfigError, ConfigResult, MalformedResponse, PipelineError,
    PipelineResult, RedactionError, RedactionResult, SinkError, SinkResult, TransportError,
    TransportErrorKind,
};
pub use models::{context_window_for, DEFAULT_CONTEXT_WINDOW};
pub use orchestrator::{AnalysisOrchestrator, ItemState, RunContext};
pub use pipeline::{plan, Pipeline, Plan};
pub use redaction::{RedactedText, Redaction, RedactionGate, RedactionMatch};
pub use report::{JobInfo, Report, RunStats, Synthesis};
pub use response::SynthesisSummary;
pub use synthesis::ReportSynthesizer;
pub use tokens::{estimate_tokens, truncate_to_tokens, CHARS_PER_TOKEN};
pub use transport::{complete_with_retry, CallOutcome, CompletionTransport, Prompt};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
