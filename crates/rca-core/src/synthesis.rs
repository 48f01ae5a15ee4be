//! Final merge of settled item results into a [`Report`].

use tracing::{debug, warn};

use crate::budget::Budget;
use crate::config::AnalysisConfig;
use crate::domain::result::AnalysisResult;
use crate::error::RedactionResult;
use crate::obs;
use crate::orchestrator::RunContext;
use crate::prompts::synthesis_prompt;
use crate::redaction::RedactionGate;
use crate::report::{JobInfo, Report, RunStats, Synthesis};
use crate::response::parse_synthesis;
use crate::transport::{complete_with_retry, CompletionTransport};

pub struct ReportSynthesizer<'a> {
    transport: &'a dyn CompletionTransport,
    gate: &'a RedactionGate,
    config: &'a AnalysisConfig,
}

impl<'a> ReportSynthesizer<'a> {
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

    /// Produce the top-level summary from every settled result.
    ///
    /// Never fails: a failed call yields [`Synthesis::Unavailable`], and an
    /// exhausted budget yields [`Synthesis::NoBudget`] without calling out.
    pub async fn synthesize(
        &self,
        job: &JobInfo,
        results: &[AnalysisResult],
        budget: &Budget,
        ctx: &RunContext,
    ) -> Synthesis {
        let synthesis = if budget.is_exhausted() {
            Synthesis::NoBudget
        } else {
            self.call(job, results, ctx).await
        };
        obs::emit_synthesis_finished(synthesis.status());
        synthesis
    }

    async fn call(&self, job: &JobInfo, results: &[AnalysisResult], ctx: &RunContext) -> Synthesis {
        let prompt = synthesis_prompt(job, results, self.config.budget.synthesis_reserve);
        let call = complete_with_retry(
            self.transport,
            &prompt,
            self.config.max_output_tokens,
            &self.config.retry,
            self.gate,
        );

        let outcome =
            match tokio::time::timeout(self.config.concurrency.synthesis_timeout(), call).await {
                Ok(outcome) => outcome,
                Err(_) => return unavailable("timed out".to_string()),
            };
        let raw = match outcome.result {
            Ok(raw) => raw,
            Err(err) => {
                let reason = self
                    .gate
                    .clean(&err.message)
                    .map(|t| format!("transport error: {t}"))
                    .unwrap_or_else(|_| "transport error".to_string());
                return unavailable(reason);
            }
        };
        let redacted = match self.gate.redact(&raw) {
            Ok(redacted) => redacted,
            Err(err) => return unavailable(format!("response withheld: {err}")),
        };
        if !redacted.matches.is_empty() {
            ctx.record_redactions(redacted.matches.len());
            obs::emit_redactions_applied("synthesis_response", redacted.matches.len());
        }

        match parse_synthesis(redacted.text.as_str()) {
            Ok(summary) => Synthesis::Completed { summary },
            Err(err) => unavailable(err.to_string()),
        }
    }

    /// Synthesize, assemble the ordered [`Report`] and run the final
    /// redaction pass over its rendered text.
    ///
    /// A redaction failure here is terminal: the report must not be shown.
    pub async fn finish(
        &self,
        job: JobInfo,
        results: Vec<AnalysisResult>,
        budget: &Budget,
        ctx: &RunContext,
    ) -> RedactionResult<Report> {
        let synthesis = self.synthesize(&job, &results, budget, ctx).await;
        let stats = RunStats {
            redactions: ctx.redactions(),
            duration_ms: ctx.elapsed().as_millis() as u64,
            ..RunStats::from_results(&results)
        };
        let report = Report::new(job, results, synthesis, stats);

        // Gate check on the final text. Sinks render their own format and
        // redact it again in `deliver`.
        let rendered = self.gate.redact(&report.render_markdown())?;
        if !rendered.matches.is_empty() {
            obs::emit_redactions_applied("report", rendered.matches.len());
        }
        debug!(
            bytes = rendered.text.len(),
            fingerprint = %report.fingerprint(),
            "report assembled"
        );
        Ok(report)
    }
}

fn unavailable(reason: String) -> Synthesis {
    warn!(reason = %reason, "synthesis unavailable");
    Synthesis::Unavailable { reason }
}
