//! Report sinks: console output and GitHub pull request comments.

use std::io::Write;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use rca_core::{RedactedText, ReportFormat, Sink, SinkError, SinkResult};

use crate::error::{CiError, Result};

const RULER_WIDTH: usize = 80;

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Prints the Markdown report to stdout between `=` rulers.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        ConsoleSink
    }

    /// The exact text written for `report`.
    pub fn frame(report: &str) -> String {
        let ruler = "=".repeat(RULER_WIDTH);
        format!("\n{ruler}\n{}\n{ruler}\n", report.trim_end())
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn emit(&self, text: &RedactedText) -> SinkResult<()> {
        let framed = Self::frame(text.as_str());
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(framed.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// Posts the comment rendering of the report on a pull request.
pub struct GithubCommentSink {
    client: reqwest::Client,
    api_base: String,
    token: String,
    repo: String,
    pr_number: u64,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// Normalise `org/repo` or `org_repo` to `org/repo`.
pub fn normalize_repo(org_repo: &str) -> Option<String> {
    let trimmed = org_repo.trim();
    let (org, repo) = trimmed
        .split_once('/')
        .or_else(|| trimmed.split_once('_'))?;
    if org.is_empty() || repo.is_empty() {
        return None;
    }
    Some(format!("{org}/{repo}"))
}

impl GithubCommentSink {
    pub fn new(token: &str, org_repo: &str, pr_number: u64) -> Result<Self> {
        let repo = normalize_repo(org_repo).ok_or_else(|| CiError::InvalidSetting {
            name: "org_repo".to_string(),
            message: format!("expected org/repo, got {org_repo:?}"),
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("ci-rca/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(GithubCommentSink {
            client,
            api_base: "https://api.github.com".to_string(),
            token: token.to_string(),
            repo,
            pr_number,
        })
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn comments_url(&self) -> String {
        format!(
            "{}/repos/{}/issues/{}/comments",
            self.api_base, self.repo, self.pr_number
        )
    }

    fn rejected(&self, message: impl Into<String>) -> SinkError {
        SinkError::Rejected {
            sink: self.name().to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Sink for GithubCommentSink {
    fn name(&self) -> &str {
        "github"
    }

    fn format(&self) -> ReportFormat {
        ReportFormat::Comment
    }

    async fn emit(&self, text: &RedactedText) -> SinkResult<()> {
        let response = self
            .client
            .post(self.comments_url())
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&CommentBody {
                body: text.as_str(),
            })
            .send()
            .await
            .map_err(|e| self.rejected(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.rejected(format!("HTTP {}", status.as_u16())));
        }
        info!(repo = %self.repo, pr = self.pr_number, "posted pull request comment");
        Ok(())
    }
}
