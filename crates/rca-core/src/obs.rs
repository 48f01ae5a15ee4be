//! Structured observability hooks for analysis run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for lifecycle events: start, budget, item settlement,
//!   redaction, synthesis, finish
//!
//! Events are emitted at `info!` level except per-item settlement, which is
//! `debug!`. Nothing emitted here carries model output or log content.

use tracing::{debug, info};

use crate::domain::item::ItemKey;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("b2c1...");
/// // every event below is tagged with run_id
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("rca.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started for a CI job.
pub fn emit_run_started(job_name: &str, build_id: &str, items: usize) {
    info!(event = "run.started", job = %job_name, build_id = %build_id, items = items);
}

/// Emit event: budget computed.
pub fn emit_budget_allocated(window: u64, reserved: u64, granted: u64, excluded: usize) {
    info!(
        event = "budget.allocated",
        window = window,
        reserved = reserved,
        granted = granted,
        excluded = excluded,
    );
}

/// Emit event: an item reached a terminal state.
pub fn emit_item_settled(item: &ItemKey, status: &str, attempts: u32) {
    debug!(event = "item.settled", item = %item, status = %status, attempts = attempts);
}

/// Emit event: secrets were rewritten at an output boundary.
pub fn emit_redactions_applied(boundary: &str, count: usize) {
    info!(event = "redaction.applied", boundary = %boundary, count = count);
}

/// Emit event: synthesis finished with the given status.
pub fn emit_synthesis_finished(status: &str) {
    info!(event = "synthesis.finished", status = %status);
}

/// Emit event: run finished.
pub fn emit_run_finished(duration_ms: u64, succeeded: usize, failed: usize, excluded: usize) {
    info!(
        event = "run.finished",
        duration_ms = duration_ms,
        succeeded = succeeded,
        failed = failed,
        excluded = excluded,
    );
}

/// Emit event: a sink could not deliver the report (warning level).
pub fn emit_sink_error(sink: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "sink.error", sink = %sink, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id");
        emit_item_settled(&ItemKey::step("build"), "succeeded", 1);
    }
}
