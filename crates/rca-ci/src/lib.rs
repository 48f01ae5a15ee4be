//! ci-rca CI collaborators
//!
//! Concrete implementations of the rca-core collaborator traits:
//! - `FsCollector` reads failed steps, tests and artifacts from a job directory
//! - `TailCondenser` shrinks oversized logs before they reach the core
//! - `HttpTransport` talks to an OpenAI-compatible completion endpoint
//! - `ConsoleSink` and `GithubCommentSink` deliver the redacted report

pub mod collector;
pub mod condenser;
pub mod error;
pub mod filter;
pub mod http;
pub mod repo;
pub mod sinks;

// Re-export key types
pub use collector::FsCollector;
pub use condenser::TailCondenser;
pub use error::{CiError, Result};
pub use filter::{split_patterns, GlobFilter, PathFilter};
pub use http::{HttpConfig, HttpTransport};
pub use repo::{infer_org_repo, resolve_org_repo};
pub use sinks::{ConsoleSink, GithubCommentSink};
