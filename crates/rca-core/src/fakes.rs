//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `ScriptedTransport`, `MemoryCollector` and `MemorySink` that
//! satisfy the trait contracts without network or filesystem access, and
//! `CapturedLogs` for asserting on emitted tracing output.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::collaborators::{CollectedJob, Collector, ReportFormat, Sink};
use crate::domain::item::{ArtifactRef, StepRef, TestRef};
use crate::error::{CollectorResult, SinkResult, TransportError};
use crate::redaction::RedactedText;
use crate::report::JobInfo;
use crate::transport::{CompletionTransport, Prompt};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Reply(Result<String, TransportError>),
    Hang,
}

/// Completion transport that replays scripted replies per prompt label.
///
/// Replies queued for a label are consumed in order. Once a label's queue is
/// empty the fallback reply is used, or a fatal error when none is set.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    hang_always: Mutex<HashSet<String>>,
    fallback: Mutex<Option<String>>,
    calls: Mutex<HashMap<String, u32>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, label: &str, reply: impl Into<String>) {
        self.push(label, Scripted::Reply(Ok(reply.into())));
    }

    pub fn push_err(&self, label: &str, err: TransportError) {
        self.push(label, Scripted::Reply(Err(err)));
    }

    /// Make the next call for `label` never return.
    pub fn push_hang(&self, label: &str) {
        self.push(label, Scripted::Hang);
    }

    /// Make every call for `label` never return.
    pub fn hang_always(&self, label: &str) {
        lock(&self.hang_always).insert(label.to_string());
    }

    pub fn set_fallback(&self, reply: impl Into<String>) {
        *lock(&self.fallback) = Some(reply.into());
    }

    fn push(&self, label: &str, scripted: Scripted) {
        lock(&self.scripts)
            .entry(label.to_string())
            .or_default()
            .push_back(scripted);
    }

    /// Number of calls made for `label`.
    pub fn calls(&self, label: &str) -> u32 {
        lock(&self.calls).get(label).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        lock(&self.calls).values().sum()
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn complete(&self, prompt: &Prompt, _max_output_tokens: u32) -> Result<String, TransportError> {
        *lock(&self.calls).entry(prompt.label.clone()).or_insert(0) += 1;
        lock(&self.prompts).push(prompt.clone());

        let hang = lock(&self.hang_always).contains(&prompt.label);
        let next = if hang {
            Scripted::Hang
        } else {
            let scripted = lock(&self.scripts)
                .get_mut(&prompt.label)
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(scripted) => scripted,
                None => Scripted::Reply(lock(&self.fallback).clone().ok_or_else(|| {
                    TransportError::fatal(format!("no scripted reply for {}", prompt.label))
                })),
            }
        };

        match next {
            Scripted::Reply(reply) => reply,
            Scripted::Hang => futures::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryCollector
// ---------------------------------------------------------------------------

/// Collector serving a fixed [`CollectedJob`]. Artifact globs are ignored.
#[derive(Debug, Default)]
pub struct MemoryCollector {
    job: CollectedJob,
}

impl MemoryCollector {
    pub fn new(job: CollectedJob) -> Self {
        Self { job }
    }
}

#[async_trait]
impl Collector for MemoryCollector {
    async fn list_failed_steps(&self, _job: &JobInfo) -> CollectorResult<Vec<StepRef>> {
        Ok(self.job.steps.clone())
    }

    async fn list_failed_tests(&self, _job: &JobInfo) -> CollectorResult<Vec<TestRef>> {
        Ok(self.job.tests.clone())
    }

    async fn list_included_artifacts(
        &self,
        _job: &JobInfo,
        _include: &[String],
        _exclude: &[String],
    ) -> CollectorResult<Vec<ArtifactRef>> {
        Ok(self.job.artifacts.clone())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Sink that records everything emitted to it.
#[derive(Debug)]
pub struct MemorySink {
    name: String,
    format: ReportFormat,
    emitted: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new(name: &str) -> Self {
        Self::with_format(name, ReportFormat::Markdown)
    }

    pub fn with_format(name: &str, format: ReportFormat) -> Self {
        Self {
            name: name.to_string(),
            format,
            emitted: Mutex::new(Vec::new()),
        }
    }

    pub fn emitted(&self) -> Vec<String> {
        lock(&self.emitted).clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> ReportFormat {
        self.format
    }

    async fn emit(&self, text: &RedactedText) -> SinkResult<()> {
        lock(&self.emitted).push(text.as_str().to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CapturedLogs
// ---------------------------------------------------------------------------

/// In-memory writer for a thread-local fmt subscriber.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route events at `level` and above on this thread into the buffer
    /// until the guard is dropped.
    pub fn install(&self, level: tracing::Level) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
