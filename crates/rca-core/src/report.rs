//! The assembled root-cause report and its renderings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::item::ItemKind;
use crate::domain::result::{AnalysisResult, AnalysisStatus, FailureCategory, Finding, FindingDetail};
use crate::response::SynthesisSummary;

/// Identity of the CI job a report describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_name: String,
    pub build_id: String,
    pub pr_number: Option<u64>,
    /// `org/repo` of the pull request, when known.
    pub org_repo: Option<String>,
}

impl JobInfo {
    pub fn new(job_name: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            build_id: build_id.into(),
            pr_number: None,
            org_repo: None,
        }
    }

    pub fn with_pr(mut self, pr_number: u64) -> Self {
        self.pr_number = Some(pr_number);
        self
    }

    pub fn with_org_repo(mut self, org_repo: impl Into<String>) -> Self {
        self.org_repo = Some(org_repo.into());
        self
    }
}

/// Outcome of the synthesis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Synthesis {
    Completed { summary: SynthesisSummary },
    /// The call failed or its answer was unusable; per-item results stand alone.
    Unavailable { reason: String },
    /// Reserved overhead consumed the whole window; no model call was made.
    NoBudget,
}

impl Synthesis {
    pub fn summary(&self) -> Option<&SynthesisSummary> {
        match self {
            Self::Completed { summary } => Some(summary),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Unavailable { .. } => "unavailable",
            Self::NoBudget => "no_budget",
        }
    }
}

/// Counters describing one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub items: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub excluded: usize,
    pub artifact_batches: usize,
    pub truncated: usize,
    pub redactions: usize,
    pub duration_ms: u64,
}

impl RunStats {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let mut stats = Self {
            items: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.status {
                AnalysisStatus::Succeeded { .. } => stats.succeeded += 1,
                AnalysisStatus::Failed { .. } => stats.failed += 1,
                AnalysisStatus::ExcludedForBudget => stats.excluded += 1,
            }
            if result.key.kind == ItemKind::ArtifactBatch {
                stats.artifact_batches += 1;
            }
            if !result.truncated.is_empty() {
                stats.truncated += 1;
            }
        }
        stats
    }
}

/// Immutable result of one pipeline run.
///
/// Results are held in canonical order: steps, then tests, then artifact
/// batches, each sorted by identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    job: JobInfo,
    results: Vec<AnalysisResult>,
    synthesis: Synthesis,
    stats: RunStats,
    generated_at: DateTime<Utc>,
}

impl Report {
    pub fn new(
        job: JobInfo,
        mut results: Vec<AnalysisResult>,
        synthesis: Synthesis,
        stats: RunStats,
    ) -> Self {
        results.sort_by(|a, b| a.key.cmp(&b.key));
        Self {
            job,
            results,
            synthesis,
            stats,
            generated_at: Utc::now(),
        }
    }

    pub fn job(&self) -> &JobInfo {
        &self.job
    }

    pub fn results(&self) -> &[AnalysisResult] {
        &self.results
    }

    pub fn synthesis(&self) -> &Synthesis {
        &self.synthesis
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn category(&self) -> FailureCategory {
        self.synthesis
            .summary()
            .map(|s| s.category)
            .unwrap_or(FailureCategory::Unknown)
    }

    pub fn is_infrastructure(&self) -> bool {
        self.category() == FailureCategory::Infrastructure
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_succeeded()).count()
    }

    /// A report is usable unless nothing succeeded and synthesis failed.
    pub fn has_usable_output(&self) -> bool {
        self.succeeded_count() > 0 || !self.synthesis.is_unavailable()
    }

    /// SHA-256 over job, ordered results and synthesis. Wall-clock fields
    /// and run statistics are left out.
    pub fn fingerprint(&self) -> String {
        let bytes =
            serde_json::to_vec(&(&self.job, &self.results, &self.synthesis)).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    // ── Markdown report ───────────────────────────────────────────────────

    /// Render the full report as Markdown.
    pub fn render_markdown(&self) -> String {
        let mut md = String::from("# Pipeline Failure Analysis\n\n");
        md.push_str(&format!("**Job:** `{}`\n", self.job.job_name));
        md.push_str(&format!("**Build:** `{}`", self.job.build_id));
        if let Some(pr) = self.job.pr_number {
            md.push_str(&format!(" | **PR:** #{pr}"));
        }
        if self.is_infrastructure() {
            md.push_str(" | **Infrastructure Issue** ⚠️");
        }
        md.push_str("\n\n---\n\n## Root Cause\n\n");

        match &self.synthesis {
            Synthesis::Completed { summary } => {
                md.push_str(&format!("{}\n\n", summary.summary));
                md.push_str(&format!(
                    "## Technical Details\n\n{}\n\n",
                    summary.detailed_analysis
                ));
            }
            Synthesis::Unavailable { reason } => {
                md.push_str(&format!(
                    "_Synthesis unavailable: {reason}. Per-item results follow._\n\n"
                ));
            }
            Synthesis::NoBudget => {
                md.push_str(
                    "_No budget available: reserved overhead consumes the whole context window, \
                     so no item was analysed._\n\n",
                );
            }
        }

        if !self.results.is_empty() {
            md.push_str("## Evidence\n\n");
            for result in &self.results {
                render_result_markdown(&mut md, result);
            }
        }

        md.push_str(&format!(
            "---\n_{} item(s): {} succeeded, {} unavailable, {} excluded for budget_\n",
            self.stats.items, self.stats.succeeded, self.stats.failed, self.stats.excluded
        ));
        md
    }

    // ── Pull request comment ──────────────────────────────────────────────

    /// Render the report in the layout used for pull request comments.
    pub fn render_comment(&self) -> String {
        let mut body = String::from("## Pipeline Failure Analysis\n\n");
        body.push_str(&format!(
            "**Category:** {}\n\n",
            title_case(self.category().as_str())
        ));

        match &self.synthesis {
            Synthesis::Completed { summary } => {
                body.push_str(&format!("{}\n\n", summary.summary));
                body.push_str(&format!(
                    "### Technical Details\n\n{}\n",
                    summary.detailed_analysis
                ));
            }
            Synthesis::Unavailable { reason } => {
                body.push_str(&format!("_Synthesis unavailable: {reason}._\n"));
            }
            Synthesis::NoBudget => body.push_str("_No budget available for analysis._\n"),
        }

        let with_findings: Vec<(&AnalysisResult, &Finding)> = self
            .results
            .iter()
            .filter_map(|r| r.finding().map(|f| (r, f)))
            .collect();
        if !with_findings.is_empty() {
            body.push_str("\n<details>\n<summary><b>Evidence</b></summary>\n\n");
            for (result, finding) in with_findings {
                body.push_str(&format!("### {}\n\n", result.key.id));
                body.push_str(&format!("**Category:** `{}`  \n", finding.category));
                body.push_str(&format!("**Root Cause:** {}\n\n", finding.root_cause));
                if !finding.evidence.is_empty() {
                    body.push_str("**Logs:**\n\n");
                    for evidence in &finding.evidence {
                        body.push_str(&format!(
                            "<details>\n<summary><code>{}</code></summary>\n\n```\n{}\n```\n</details>\n\n",
                            evidence.source,
                            evidence.content.replace('`', "'")
                        ));
                    }
                }
            }
            body.push_str("</details>\n");
        }

        let unavailable: Vec<String> = self
            .results
            .iter()
            .filter(|r| !r.is_succeeded())
            .map(|r| match &r.status {
                AnalysisStatus::Failed { reason } => format!("- `{}`: analysis unavailable ({reason})", r.key),
                _ => format!("- `{}`: excluded for budget", r.key),
            })
            .collect();
        if !unavailable.is_empty() {
            body.push_str("\n**Not analysed:**\n\n");
            body.push_str(&unavailable.join("\n"));
            body.push('\n');
        }

        body.push_str(&format!(
            "\n---\n*Analysis by ci-rca | Build: `{}`*\n",
            self.job.build_id
        ));
        body
    }
}

fn render_result_markdown(md: &mut String, result: &AnalysisResult) {
    match &result.status {
        AnalysisStatus::Succeeded { finding } => {
            md.push_str(&format!("### {} ({})\n\n", result.key, finding.category));
            md.push_str(&format!("**Root cause:** {}\n\n", finding.root_cause));
            for evidence in &finding.evidence {
                md.push_str(&format!("- `{}`: {}\n", evidence.source, evidence.content));
            }
            match &finding.detail {
                FindingDetail::Step { dependencies } if !dependencies.is_empty() => {
                    md.push_str(&format!("\n_Depends on: {}_\n", dependencies.join(", ")));
                }
                FindingDetail::Test {
                    source_file: Some(file),
                } => {
                    md.push_str(&format!("\n_Source: `{file}`_\n"));
                }
                FindingDetail::ArtifactBatch { artifacts } => {
                    for artifact in artifacts {
                        md.push_str(&format!(
                            "- **{}**: {}\n",
                            artifact.path, artifact.key_findings
                        ));
                    }
                }
                _ => {}
            }
        }
        AnalysisStatus::Failed { reason } => {
            md.push_str(&format!("### {}\n\n_Analysis unavailable: {reason}._\n", result.key));
        }
        AnalysisStatus::ExcludedForBudget => {
            md.push_str(&format!("### {}\n\n_Excluded for budget._\n", result.key));
        }
    }
    if !result.truncated.is_empty() {
        md.push_str(&format!(
            "\n_Truncated to fit the budget: {}_\n",
            result.truncated.join(", ")
        ));
    }
    md.push('\n');
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::ItemKey;
    use crate::domain::result::{Evidence, FailureReason};

    fn finding(category: FailureCategory) -> Finding {
        Finding {
            category,
            root_cause: "etcd lost quorum".to_string(),
            evidence: vec![Evidence {
                source: "build-log.txt".to_string(),
                content: "leader changed `3` times".to_string(),
            }],
            detail: FindingDetail::Step {
                dependencies: vec![],
            },
        }
    }

    fn completed() -> Synthesis {
        Synthesis::Completed {
            summary: SynthesisSummary {
                summary: "The control plane was unstable.".to_string(),
                detailed_analysis: "- Immediate Cause: etcd".to_string(),
                category: FailureCategory::Infrastructure,
            },
        }
    }

    fn report(results: Vec<AnalysisResult>, synthesis: Synthesis) -> Report {
        let stats = RunStats::from_results(&results);
        Report::new(
            JobInfo::new("pull-ci-o-r-main-e2e", "42").with_pr(7),
            results,
            synthesis,
            stats,
        )
    }

    #[test]
    fn test_results_are_ordered_canonically() {
        let r = report(
            vec![
                AnalysisResult::excluded(ItemKey::batch("artifacts-001")),
                AnalysisResult::failed(ItemKey::test("b"), FailureReason::TimedOut),
                AnalysisResult::succeeded(ItemKey::step("e2e"), finding(FailureCategory::Test)),
                AnalysisResult::failed(ItemKey::test("a"), FailureReason::TimedOut),
            ],
            completed(),
        );
        let keys: Vec<String> = r.results().iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["step:e2e", "test:a", "test:b", "artifact_batch:artifacts-001"]);
    }

    #[test]
    fn test_markdown_marks_every_status() {
        let r = report(
            vec![
                AnalysisResult::succeeded(ItemKey::step("e2e"), finding(FailureCategory::Infrastructure)),
                AnalysisResult::failed(ItemKey::test("a"), FailureReason::TimedOut),
                AnalysisResult::excluded(ItemKey::batch("artifacts-001"))
                    .with_truncated(vec!["pods.yaml".to_string()]),
            ],
            completed(),
        );
        let md = r.render_markdown();
        assert!(md.contains("**PR:** #7"));
        assert!(md.contains("**Infrastructure Issue**"));
        assert!(md.contains("The control plane was unstable."));
        assert!(md.contains("_Analysis unavailable: timed out._"));
        assert!(md.contains("_Excluded for budget._"));
        assert!(md.contains("Truncated to fit the budget: pods.yaml"));
        assert!(md.find("step:e2e") < md.find("test:a"));
    }

    #[test]
    fn test_markdown_marks_missing_synthesis() {
        let r = report(
            vec![AnalysisResult::succeeded(ItemKey::step("e2e"), finding(FailureCategory::Build))],
            Synthesis::Unavailable {
                reason: "timed out".to_string(),
            },
        );
        assert!(r.render_markdown().contains("_Synthesis unavailable: timed out."));
        assert!(r.has_usable_output());
        assert_eq!(r.category(), FailureCategory::Unknown);
    }

    #[test]
    fn test_comment_escapes_backticks_in_evidence() {
        let r = report(
            vec![AnalysisResult::succeeded(ItemKey::step("e2e"), finding(FailureCategory::Build))],
            completed(),
        );
        let comment = r.render_comment();
        assert!(comment.contains("**Category:** Infrastructure"));
        assert!(comment.contains("leader changed '3' times"));
        assert!(comment.contains("Build: `42`"));
    }

    #[test]
    fn test_fingerprint_ignores_timestamps() {
        let make = || {
            report(
                vec![AnalysisResult::succeeded(ItemKey::step("e2e"), finding(FailureCategory::Build))],
                completed(),
            )
        };
        let a = make();
        let b = make();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let c = report(vec![], completed());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_no_usable_output_when_nothing_succeeded_and_no_synthesis() {
        let r = report(
            vec![AnalysisResult::failed(ItemKey::test("a"), FailureReason::TimedOut)],
            Synthesis::Unavailable {
                reason: "transport".to_string(),
            },
        );
        assert!(!r.has_usable_output());
    }
}
