//! Parsing of (already redacted) model responses.
//!
//! Models wrap JSON in prose or code fences often enough that the first `{`
//! to the last `}` is taken as the payload. Missing mandatory fields make the
//! whole response malformed; nothing is partially accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::item::FailureItem;
use crate::domain::result::{ArtifactFinding, Evidence, FailureCategory, Finding, FindingDetail};
use crate::error::MalformedResponse;

/// Top-level summary produced by the synthesis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisSummary {
    pub summary: String,
    pub detailed_analysis: String,
    pub category: FailureCategory,
}

#[derive(Deserialize)]
struct RawFinding {
    #[serde(alias = "failure_category")]
    category: Option<String>,
    root_cause: Option<String>,
    evidence: Option<Vec<RawEvidence>>,
    #[serde(default, alias = "artifact_findings")]
    artifacts: Vec<RawArtifact>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEvidence {
    Text(String),
    Sourced {
        source: Option<String>,
        content: String,
    },
}

#[derive(Deserialize)]
struct RawArtifact {
    #[serde(alias = "artifact_path")]
    path: String,
    key_findings: String,
}

#[derive(Deserialize)]
struct RawSynthesis {
    summary: Option<String>,
    detailed_analysis: Option<String>,
    category: Option<String>,
}

/// Locate the JSON object inside a response.
pub fn extract_json(text: &str) -> Result<Value, MalformedResponse> {
    let start = text.find('{');
    let end = text.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(MalformedResponse("no JSON object in response".to_string()));
    };
    if end < start {
        return Err(MalformedResponse("no JSON object in response".to_string()));
    }
    let value: Value = serde_json::from_str(&text[start..=end])
        .map_err(|e| MalformedResponse(format!("invalid JSON: {e}")))?;
    if !value.is_object() {
        return Err(MalformedResponse("response is not a JSON object".to_string()));
    }
    Ok(value)
}

fn required(field: &str, value: Option<String>) -> Result<String, MalformedResponse> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(MalformedResponse(format!("missing field `{field}`"))),
    }
}

/// Parse an item analysis response into a [`Finding`].
pub fn parse_finding(item: &FailureItem<'_>, text: &str) -> Result<Finding, MalformedResponse> {
    let raw: RawFinding = serde_json::from_value(extract_json(text)?)
        .map_err(|e| MalformedResponse(format!("unexpected shape: {e}")))?;

    let category = FailureCategory::parse(&required("category", raw.category)?);
    let root_cause = required("root_cause", raw.root_cause)?;
    let evidence = raw
        .evidence
        .ok_or_else(|| MalformedResponse("missing field `evidence`".to_string()))?
        .into_iter()
        .map(|e| match e {
            RawEvidence::Text(content) => Evidence {
                source: item.id().to_string(),
                content,
            },
            RawEvidence::Sourced { source, content } => Evidence {
                source: source.unwrap_or_else(|| item.id().to_string()),
                content,
            },
        })
        .collect();

    let detail = match item {
        FailureItem::Step(step) => FindingDetail::Step {
            dependencies: step.dependencies.clone(),
        },
        FailureItem::Test(test) => FindingDetail::Test {
            source_file: test.source_file.clone(),
        },
        FailureItem::ArtifactBatch(_) => FindingDetail::ArtifactBatch {
            artifacts: raw
                .artifacts
                .into_iter()
                .map(|a| ArtifactFinding {
                    path: a.path,
                    key_findings: a.key_findings,
                })
                .collect(),
        },
    };

    Ok(Finding {
        category,
        root_cause,
        evidence,
        detail,
    })
}

/// Parse the synthesis response.
pub fn parse_synthesis(text: &str) -> Result<SynthesisSummary, MalformedResponse> {
    let raw: RawSynthesis = serde_json::from_value(extract_json(text)?)
        .map_err(|e| MalformedResponse(format!("unexpected shape: {e}")))?;
    Ok(SynthesisSummary {
        summary: required("summary", raw.summary)?,
        detailed_analysis: required("detailed_analysis", raw.detailed_analysis)?,
        category: FailureCategory::parse(&required("category", raw.category)?),
    })
}
