//! Prompt construction for item analyses and synthesis.
//!
//! Item content is cut to the item's allocation before it is placed in a
//! prompt. Instruction text is covered by the budget's prompt overhead.

use serde_json::json;

use crate::domain::item::{ArtifactBatch, FailureItem, ItemKind, StepRef, TestRef};
use crate::domain::result::{AnalysisResult, AnalysisStatus};
use crate::report::JobInfo;
use crate::tokens::truncate_to_tokens;
use crate::transport::Prompt;

/// Label used for the synthesis call.
pub const SYNTHESIS_LABEL: &str = "synthesis";

const RESPONSE_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{"category": "infrastructure|test|build|configuration|timeout|unknown",
 "root_cause": "one or two sentences",
 "evidence": [{"source": "where the excerpt came from", "content": "verbatim excerpt"}]}"#;

const STEP_INSTRUCTIONS: &str = "You analyse a failed CI pipeline step and identify its root cause. \
The log has been condensed: repetitive output was removed and the final lines are always kept. \
Focus on errors, exceptions and the first failure that blocked the step. \
Quote 3-5 short, selective log excerpts as evidence. Be concise and specific.";

const TEST_INSTRUCTIONS: &str = "You analyse a failed test case from xUnit results. \
Identify the immediate technical cause, not its symptoms. \
Distinguish creation failures from validation failures and from timeouts. \
Quote the lines that show the failure as evidence. Be concise and technical.";

const ARTIFACT_INSTRUCTIONS: &str = "You review diagnostic artifacts collected from a failed CI job. \
Artifacts describe the environment (cluster state, resource dumps, configuration); they are not \
failure sources themselves. Extract the relevant environmental details from each artifact \
independently. In addition to the common fields, return \"artifacts\": \
[{\"path\": \"artifact path\", \"key_findings\": \"2-3 sentences\"}] with one entry per artifact.";

const SYNTHESIS_INSTRUCTIONS: &str = r#"You write the root cause analysis for a failed CI job from per-item analyses.
Identify the PRIMARY blocking failure: the one that happened first and prevented other work.
Distinguish primary failures from secondary quality or validation checks.
Use only facts present in the analyses. Do not repeat the root cause across sections.
Artifact findings are environment context only.
Respond with a single JSON object and nothing else:
{"summary": "the primary root cause in 1-2 sentences",
 "detailed_analysis": "markdown with three bullet groups: Immediate Cause, Contributing Factors, Impact",
 "category": "infrastructure|test|build|configuration|timeout|unknown"}"#;

/// A prompt plus the identifiers whose content was cut to fit.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub prompt: Prompt,
    pub truncated: Vec<String>,
}

/// Build the analysis prompt for `item` within `allocation` tokens.
pub fn item_prompt(item: &FailureItem<'_>, allocation: u64) -> PreparedPrompt {
    let label = item.key().to_string();
    match item {
        FailureItem::Step(step) => step_prompt(label, step, allocation),
        FailureItem::Test(test) => test_prompt(label, test, allocation),
        FailureItem::ArtifactBatch(batch) => batch_prompt(label, batch, allocation),
    }
}

fn system(instructions: &str) -> String {
    format!("{instructions}\n\n{RESPONSE_FORMAT}")
}

fn step_prompt(label: String, step: &StepRef, allocation: u64) -> PreparedPrompt {
    let (log, cut) = truncate_to_tokens(&step.log, allocation);
    let dependencies = if step.dependencies.is_empty() {
        "none recorded".to_string()
    } else {
        step.dependencies.join(", ")
    };
    let user = format!(
        "Step: {}\nDependencies: {}\n\nLog:\n{}",
        step.name, dependencies, log
    );
    PreparedPrompt {
        prompt: Prompt::new(label, system(STEP_INSTRUCTIONS), user),
        truncated: if cut { vec![step.name.clone()] } else { Vec::new() },
    }
}

fn test_prompt(label: String, test: &TestRef, allocation: u64) -> PreparedPrompt {
    let (details, cut) = truncate_to_tokens(&test.details, allocation);
    let mut user = format!("Test: {}\n", test.identifier);
    if let Some(file) = &test.source_file {
        user.push_str(&format!("Source file: {file}\n"));
    }
    user.push_str(&format!(
        "Failure type: {}\nFailure message: {}\n\nDetails:\n{}",
        test.failure_type.as_deref().unwrap_or("unknown"),
        test.failure_message.as_deref().unwrap_or("none"),
        details
    ));
    PreparedPrompt {
        prompt: Prompt::new(label, system(TEST_INSTRUCTIONS), user),
        truncated: if cut {
            vec![test.identifier.clone()]
        } else {
            Vec::new()
        },
    }
}

fn batch_prompt(label: String, batch: &ArtifactBatch<'_>, allocation: u64) -> PreparedPrompt {
    let batch_size = batch.size_tokens().max(1);
    let mut truncated = Vec::new();
    let mut user = format!("Artifact batch {}:\n", batch.id);

    for member in &batch.members {
        // Each member gets a share of the allocation proportional to its size.
        let share = (allocation as u128 * member.size_tokens as u128 / batch_size as u128) as u64;
        let (content, cut) = truncate_to_tokens(&member.artifact.content, share.min(member.size_tokens));
        if cut || member.truncated {
            truncated.push(member.artifact.path.clone());
        }
        user.push_str(&format!("\n=== {} ===\n{}\n", member.artifact.path, content));
    }

    PreparedPrompt {
        prompt: Prompt::new(label, system(ARTIFACT_INSTRUCTIONS), user),
        truncated,
    }
}

/// Build the synthesis prompt from settled results, cut to `reserve` tokens.
pub fn synthesis_prompt(job: &JobInfo, results: &[AnalysisResult], reserve: u64) -> Prompt {
    let mut steps = Vec::new();
    let mut tests = Vec::new();
    let mut artifacts = Vec::new();
    let mut unavailable = Vec::new();

    for result in results {
        match &result.status {
            AnalysisStatus::Succeeded { finding } => {
                let entry = json!({
                    "item": result.key.id,
                    "category": finding.category,
                    "root_cause": finding.root_cause,
                    "evidence": finding.evidence,
                    "detail": finding.detail,
                });
                match result.key.kind {
                    ItemKind::Step => steps.push(entry),
                    ItemKind::Test => tests.push(entry),
                    ItemKind::ArtifactBatch => artifacts.push(entry),
                }
            }
            AnalysisStatus::Failed { reason } => unavailable.push(json!({
                "item": result.key.to_string(),
                "status": "analysis unavailable",
                "reason": reason.to_string(),
            })),
            AnalysisStatus::ExcludedForBudget => unavailable.push(json!({
                "item": result.key.to_string(),
                "status": "excluded for budget",
            })),
        }
    }

    let pr = job
        .pr_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let body = format!(
        "Job: {}\nBuild: {}\nPR: {}\n\nFailed step analyses:\n{}\n\nFailed test analyses:\n{}\n\n\
         Additional context (artifacts):\n{}\n\nItems without analysis:\n{}",
        job.job_name,
        job.build_id,
        pr,
        serde_json::Value::Array(steps),
        serde_json::Value::Array(tests),
        serde_json::Value::Array(artifacts),
        serde_json::Value::Array(unavailable),
    );
    let (user, _) = truncate_to_tokens(&body, reserve);

    Prompt::new(SYNTHESIS_LABEL, SYNTHESIS_INSTRUCTIONS, user.into_owned())
}
