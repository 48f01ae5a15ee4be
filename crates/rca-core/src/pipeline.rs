//! End-to-end analysis run: batch, allocate, analyse, synthesize.

use tracing::{info, instrument};

use crate::batcher::batch_artifacts;
use crate::budget::{allocate, Budget};
use crate::collaborators::CollectedJob;
use crate::config::AnalysisConfig;
use crate::domain::item::FailureItem;
use crate::error::{PipelineError, PipelineResult};
use crate::obs;
use crate::orchestrator::{AnalysisOrchestrator, RunContext};
use crate::redaction::RedactionGate;
use crate::report::{JobInfo, Report};
use crate::synthesis::ReportSynthesizer;
use crate::transport::CompletionTransport;

/// Items and budget for a run, borrowed from the collected job.
#[derive(Debug)]
pub struct Plan<'a> {
    pub items: Vec<FailureItem<'a>>,
    pub budget: Budget,
}

impl Plan<'_> {
    pub fn artifact_batches(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i, FailureItem::ArtifactBatch(_)))
            .count()
    }
}

/// Batch artifacts and allocate the budget without calling any model.
///
/// Item keys in `input` must be distinct; see
/// [`CollectedJob::with_unique_keys`].
pub fn plan<'a>(input: &'a CollectedJob, config: &AnalysisConfig) -> Plan<'a> {
    let mut items: Vec<FailureItem<'a>> = input.steps.iter().map(FailureItem::Step).collect();
    items.extend(input.tests.iter().map(FailureItem::Test));
    items.extend(
        batch_artifacts(&input.artifacts, config.budget.artifact_batch_ceiling)
            .into_iter()
            .map(FailureItem::ArtifactBatch),
    );
    items.sort_by_key(FailureItem::key);

    let budget = allocate(&items, &config.budget);
    Plan { items, budget }
}

pub struct Pipeline<'a> {
    transport: &'a dyn CompletionTransport,
    gate: &'a RedactionGate,
    config: &'a AnalysisConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        transport: &'a dyn CompletionTransport,
        gate: &'a RedactionGate,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            transport,
            gate,
            config,
        }
    }

    /// Run the full analysis for one job.
    ///
    /// Fails only when there is nothing to analyse, when the final report
    /// cannot be redacted, or when neither an item analysis nor synthesis
    /// produced anything (the report is still attached for display).
    #[instrument(skip_all, fields(job = %job.job_name, build_id = %job.build_id))]
    pub async fn run(&self, job: JobInfo, input: &CollectedJob) -> PipelineResult<Report> {
        if input.is_empty() {
            return Err(PipelineError::NoInput);
        }

        let input = input.with_unique_keys();
        let plan = plan(&input, self.config);
        obs::emit_run_started(&job.job_name, &job.build_id, plan.items.len());
        obs::emit_budget_allocated(
            plan.budget.total_window(),
            plan.budget.reserved_overhead(),
            plan.budget.total_granted(),
            plan.budget.excluded().count(),
        );

        let ctx = RunContext::from_config(self.config);
        let orchestrator = AnalysisOrchestrator::new(self.transport, self.gate, self.config);
        let results = orchestrator.run(&plan.items, &plan.budget, &ctx).await;

        let synthesizer = ReportSynthesizer::new(self.transport, self.gate, self.config);
        let report = synthesizer.finish(job, results, &plan.budget, &ctx).await?;

        let stats = report.stats();
        obs::emit_run_finished(stats.duration_ms, stats.succeeded, stats.failed, stats.excluded);
        info!(
            fingerprint = %report.fingerprint(),
            synthesis = report.synthesis().status(),
            "analysis complete"
        );

        if !report.has_usable_output() {
            return Err(PipelineError::NoUsableOutput {
                report: Box::new(report),
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::{ArtifactRef, ItemKey, StepRef, TestRef};

    #[test]
    fn test_plan_orders_items_and_batches_artifacts() {
        let input = CollectedJob {
            steps: vec![StepRef::new("e2e", "boom")],
            tests: vec![TestRef::new("z.case", "x"), TestRef::new("a.case", "y")],
            artifacts: vec![ArtifactRef::new("a.txt", "a"), ArtifactRef::new("b.txt", "b")],
        };
        let plan = plan(&input, &AnalysisConfig::default());

        let keys: Vec<ItemKey> = plan.items.iter().map(FailureItem::key).collect();
        assert_eq!(
            keys,
            vec![
                ItemKey::step("e2e"),
                ItemKey::test("a.case"),
                ItemKey::test("z.case"),
                ItemKey::batch("artifacts-001"),
            ]
        );
        assert_eq!(plan.artifact_batches(), 1);
        assert_eq!(plan.budget.len(), 4);
    }
}
