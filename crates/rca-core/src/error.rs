//! Error taxonomy for the analysis pipeline.
//!
//! Per-item problems never surface here: they are captured as
//! [`FailureReason`](crate::domain::result::FailureReason) values inside the
//! Report. Only configuration errors, missing input, and redaction failures
//! on the final report end a run.

use crate::report::Report;

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Class of a completion transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Provider throttled the request; retried with the longer backoff.
    RateLimited,
    /// Network or provider hiccup; retried.
    Transient,
    /// The prompt does not fit the model; never retried.
    ContextOverflow,
    /// The provider answered with an unreadable envelope; never retried.
    InvalidResponse,
    /// Authentication, bad request and the like; never retried.
    Fatal,
}

/// Error returned by a [`CompletionTransport`](crate::transport::CompletionTransport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Transient, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::RateLimited, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Fatal, message)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::RateLimited | TransportErrorKind::Transient
        )
    }
}

/// Errors raised by the redaction gate. Text is withheld when one occurs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedactionError {
    #[error("detector {kind} has an invalid pattern: {message}")]
    InvalidPattern { kind: String, message: String },

    #[error("text of {len} bytes exceeds the scan limit of {limit} bytes")]
    InputTooLarge { len: usize, limit: usize },

    #[error("detector {kind} still matches after redaction")]
    Residual { kind: String },
}

/// Result type for redaction operations.
pub type RedactionResult<T> = std::result::Result<T, RedactionError>;

/// Model answer could not be turned into a structured result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed response: {0}")]
pub struct MalformedResponse(pub String);

/// Errors produced by upstream collectors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid job data in {path}: {message}")]
    InvalidData { path: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for collector operations.
pub type CollectorResult<T> = std::result::Result<T, CollectorError>;

/// Errors produced by output sinks.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink {sink} rejected the report: {message}")]
    Rejected { sink: String, message: String },

    #[error("report withheld: {0}")]
    Withheld(#[from] RedactionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Terminal pipeline failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no failure items to analyse")]
    NoInput,

    #[error("no item analysis succeeded and synthesis is unavailable")]
    NoUsableOutput { report: Box<Report> },

    #[error("final report withheld: {0}")]
    Redaction(#[from] RedactionError),

    #[error("failed to collect job data: {0}")]
    Collect(#[from] CollectorError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for pipeline runs.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
