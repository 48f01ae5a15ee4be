//! Bounded-parallel per-item analysis.
//!
//! Every item settles into exactly one [`AnalysisResult`]. Items run
//! concurrently on the current task, gated by the run's semaphore; a failure
//! or timeout in one item never touches its siblings.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::budget::Budget;
use crate::config::AnalysisConfig;
use crate::domain::item::{FailureItem, ItemKey};
use crate::domain::result::{AnalysisResult, FailureReason};
use crate::obs;
use crate::prompts::item_prompt;
use crate::redaction::RedactionGate;
use crate::response::parse_finding;
use crate::transport::{complete_with_retry, CompletionTransport, Prompt};

/// Lifecycle of one item analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: ItemState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tracks one item through the state machine.
#[derive(Debug)]
struct Tracker {
    key: ItemKey,
    state: ItemState,
}

impl Tracker {
    fn new(key: ItemKey) -> Self {
        Self {
            key,
            state: ItemState::Pending,
        }
    }

    fn advance(&mut self, next: ItemState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next} for {}",
            self.state,
            self.key
        );
        debug!(item = %self.key, from = %self.state, to = %next, "item state");
        self.state = next;
    }
}

/// Run-scoped shared state: the worker-pool semaphore, the run deadline and
/// a redaction counter.
///
/// Created per pipeline run and passed by reference to every worker.
#[derive(Debug)]
pub struct RunContext {
    slots: Semaphore,
    started: Instant,
    deadline: Instant,
    redactions: AtomicUsize,
}

impl RunContext {
    pub fn new(max_in_flight: usize, run_deadline: Duration) -> Self {
        let started = Instant::now();
        Self {
            slots: Semaphore::new(max_in_flight.max(1)),
            started,
            deadline: started + run_deadline,
            redactions: AtomicUsize::new(0),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            config.concurrency.max_in_flight,
            config.concurrency.run_deadline(),
        )
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn record_redactions(&self, count: usize) {
        self.redactions.fetch_add(count, Ordering::Relaxed);
    }

    /// Secrets rewritten so far in this run.
    pub fn redactions(&self) -> usize {
        self.redactions.load(Ordering::Relaxed)
    }
}

pub struct AnalysisOrchestrator<'a> {
    transport: &'a dyn CompletionTransport,
    gate: &'a RedactionGate,
    config: &'a AnalysisConfig,
}

impl<'a> AnalysisOrchestrator<'a> {
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

    /// Analyse every item, returning one result per item in [`ItemKey`] order.
    ///
    /// Items the budget excluded settle immediately without a model call.
    /// Items still pending or running at the run deadline settle as
    /// [`FailureReason::TimedOut`].
    pub async fn run(
        &self,
        items: &[FailureItem<'_>],
        budget: &Budget,
        ctx: &RunContext,
    ) -> Vec<AnalysisResult> {
        let mut results = join_all(items.iter().map(|item| self.settle(item, budget, ctx))).await;
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    async fn settle(
        &self,
        item: &FailureItem<'_>,
        budget: &Budget,
        ctx: &RunContext,
    ) -> AnalysisResult {
        let key = item.key();
        let Some(tokens) = budget.granted(&key) else {
            obs::emit_item_settled(&key, "excluded_for_budget", 0);
            return AnalysisResult::excluded(key);
        };

        let prepared = item_prompt(item, tokens);
        let mut tracker = Tracker::new(key.clone());
        let analysed =
            tokio::time::timeout_at(ctx.deadline, self.analyze(item, &prepared.prompt, ctx, &mut tracker))
                .await;

        let result = match analysed {
            Ok(result) => result,
            Err(_) => {
                warn!(item = %key, state = %tracker.state, "run deadline reached, item cancelled");
                tracker.advance(ItemState::Failed);
                obs::emit_item_settled(&key, "failed", 0);
                AnalysisResult::failed(key, FailureReason::TimedOut)
            }
        };
        result.with_truncated(prepared.truncated)
    }

    async fn analyze(
        &self,
        item: &FailureItem<'_>,
        prompt: &Prompt,
        ctx: &RunContext,
        tracker: &mut Tracker,
    ) -> AnalysisResult {
        let key = tracker.key.clone();
        let Ok(_permit) = ctx.slots.acquire().await else {
            tracker.advance(ItemState::Failed);
            return AnalysisResult::failed(
                key,
                FailureReason::Transport {
                    attempts: 0,
                    message: "worker pool closed".to_string(),
                },
            );
        };
        tracker.advance(ItemState::Running);

        let outcome = complete_with_retry(
            self.transport,
            prompt,
            self.config.max_output_tokens,
            &self.config.retry,
            self.gate,
        )
        .await;

        let raw = match outcome.result {
            Ok(raw) => raw,
            Err(err) => {
                // Provider error bodies can echo request content.
                let message = self
                    .gate
                    .clean(&err.to_string())
                    .map(|t| t.into_string())
                    .unwrap_or_else(|_| "error message withheld".to_string());
                warn!(item = %key, attempts = outcome.attempts, error = %message, "analysis call failed");
                tracker.advance(ItemState::Failed);
                obs::emit_item_settled(&key, "failed", outcome.attempts);
                return AnalysisResult::failed(
                    key,
                    FailureReason::Transport {
                        attempts: outcome.attempts,
                        message,
                    },
                );
            }
        };

        let redacted = match self.gate.redact(&raw) {
            Ok(redacted) => redacted,
            Err(err) => {
                warn!(item = %key, error = %err, "response withheld");
                tracker.advance(ItemState::Failed);
                obs::emit_item_settled(&key, "failed", outcome.attempts);
                return AnalysisResult::failed(
                    key,
                    FailureReason::RedactionFailure {
                        message: err.to_string(),
                    },
                );
            }
        };
        if !redacted.matches.is_empty() {
            ctx.record_redactions(redacted.matches.len());
            obs::emit_redactions_applied("model_response", redacted.matches.len());
        }

        match parse_finding(item, redacted.text.as_str()) {
            Ok(finding) => {
                tracker.advance(ItemState::Succeeded);
                obs::emit_item_settled(&key, "succeeded", outcome.attempts);
                AnalysisResult::succeeded(key, finding)
            }
            Err(err) => {
                warn!(item = %key, error = %err, "malformed analysis response");
                tracker.advance(ItemState::Failed);
                obs::emit_item_settled(&key, "failed", outcome.attempts);
                AnalysisResult::failed(key, FailureReason::MalformedResponse { message: err.0 })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_transitions() {
        use ItemState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(Succeeded.is_terminal() && Failed.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[tokio::test]
    async fn test_run_context_bounds_slots() {
        let ctx = RunContext::new(3, Duration::from_secs(5));
        assert_eq!(ctx.available_slots(), 3);
        assert!(ctx.deadline() > Instant::now());

        let zero = RunContext::new(0, Duration::from_secs(5));
        assert_eq!(zero.available_slots(), 1);

        ctx.record_redactions(2);
        ctx.record_redactions(1);
        assert_eq!(ctx.redactions(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancellation_emits_settled_event() {
        use crate::budget::allocate;
        use crate::config::RedactionConfig;
        use crate::domain::item::TestRef;
        use crate::fakes::{CapturedLogs, ScriptedTransport};

        let logs = CapturedLogs::default();
        let _guard = logs.install(tracing::Level::DEBUG);

        let transport = ScriptedTransport::new();
        transport.hang_always("test:Suite.hung");
        let gate = RedactionGate::new(&RedactionConfig::default()).expect("gate");
        let config = AnalysisConfig::default();
        let test = TestRef::new("Suite.hung", "waiting");
        let items = [FailureItem::Test(&test)];
        let budget = allocate(&items, &config.budget);
        let ctx = RunContext::new(1, Duration::from_secs(5));

        let results = AnalysisOrchestrator::new(&transport, &gate, &config)
            .run(&items, &budget, &ctx)
            .await;

        assert_eq!(
            results[0].status,
            crate::domain::result::AnalysisStatus::Failed {
                reason: FailureReason::TimedOut
            }
        );
        let captured = logs.contents();
        assert!(captured.contains("item.settled"));
        assert!(captured.contains("test:Suite.hung"));
        assert!(captured.contains("status=failed"));
    }
}
