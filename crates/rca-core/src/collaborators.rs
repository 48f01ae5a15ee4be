//! Interfaces to the collaborators around the core.
//!
//! Collectors and preprocessors feed the pipeline; sinks receive its output.
//! A sink can only be handed [`RedactedText`], and [`deliver`] runs a fresh
//! redaction pass for every sink.

use std::borrow::Cow;
use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::item::{ArtifactRef, StepRef, TestRef};
use crate::error::{CollectorResult, SinkError, SinkResult};
use crate::obs;
use crate::redaction::{RedactedText, RedactionGate};
use crate::report::{JobInfo, Report};

/// Source of failure items for one CI job.
///
/// Implementations filter out binary artifacts and apply step and artifact
/// glob filters before returning.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn list_failed_steps(&self, job: &JobInfo) -> CollectorResult<Vec<StepRef>>;

    async fn list_failed_tests(&self, job: &JobInfo) -> CollectorResult<Vec<TestRef>>;

    async fn list_included_artifacts(
        &self,
        job: &JobInfo,
        include: &[String],
        exclude: &[String],
    ) -> CollectorResult<Vec<ArtifactRef>>;
}

/// Reduces large log text to a bounded size before it reaches the core.
pub trait Preprocessor: Send + Sync {
    fn condense(&self, raw: &str, device_hint: Option<&str>) -> String;
}

/// Which rendering of the report a sink wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Comment,
}

/// Output destination for report text.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    fn format(&self) -> ReportFormat {
        ReportFormat::Markdown
    }

    async fn emit(&self, text: &RedactedText) -> SinkResult<()>;
}

/// Everything collected for one job, owned by the caller for the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedJob {
    pub steps: Vec<StepRef>,
    pub tests: Vec<TestRef>,
    pub artifacts: Vec<ArtifactRef>,
}

impl CollectedJob {
    /// Gather steps, tests and artifacts from `collector`.
    pub async fn collect(
        collector: &dyn Collector,
        job: &JobInfo,
        include: &[String],
        exclude: &[String],
    ) -> CollectorResult<Self> {
        let steps = collector.list_failed_steps(job).await?;
        let tests = collector.list_failed_tests(job).await?;
        let artifacts = collector
            .list_included_artifacts(job, include, exclude)
            .await?;
        info!(
            steps = steps.len(),
            tests = tests.len(),
            artifacts = artifacts.len(),
            "collected job data"
        );
        let job = Self {
            steps,
            tests,
            artifacts,
        };
        Ok(job.with_unique_keys().into_owned())
    }

    /// Rename repeated step names and test identifiers so every item key is
    /// distinct. The first occurrence keeps its name; later ones get `#2`,
    /// `#3`, ... in input order, skipping names already taken.
    ///
    /// Borrows when nothing repeats.
    pub fn with_unique_keys(&self) -> Cow<'_, Self> {
        let steps = unique_names(self.steps.iter().map(|s| s.name.as_str()));
        let tests = unique_names(self.tests.iter().map(|t| t.identifier.as_str()));
        if steps.is_none() && tests.is_none() {
            return Cow::Borrowed(self);
        }

        let mut job = self.clone();
        if let Some(names) = steps {
            for (step, name) in job.steps.iter_mut().zip(names) {
                step.name = name;
            }
        }
        if let Some(names) = tests {
            for (test, name) in job.tests.iter_mut().zip(names) {
                test.identifier = name;
            }
        }
        Cow::Owned(job)
    }

    /// No failed steps and no failed tests. Artifacts alone are context, not
    /// failures.
    pub fn has_no_failures(&self) -> bool {
        self.steps.is_empty() && self.tests.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.has_no_failures() && self.artifacts.is_empty()
    }
}

/// Deduplicated names in input order, or `None` when all are distinct.
fn unique_names<'a>(names: impl Iterator<Item = &'a str> + Clone) -> Option<Vec<String>> {
    let mut seen = HashSet::new();
    if names.clone().all(|n| seen.insert(n)) {
        return None;
    }

    let mut taken: HashSet<String> = names.clone().map(str::to_string).collect();
    let mut first = HashSet::new();
    let renamed = names
        .map(|name| {
            if first.insert(name) {
                return name.to_string();
            }
            let mut n = 2;
            loop {
                let candidate = format!("{name}#{n}");
                if taken.insert(candidate.clone()) {
                    warn!(original = name, renamed = %candidate, "duplicate item key renamed");
                    return candidate;
                }
                n += 1;
            }
        })
        .collect();
    Some(renamed)
}

/// Delivery outcome for one sink.
#[derive(Debug)]
pub struct Delivery {
    pub sink: String,
    pub result: SinkResult<()>,
}

/// Render `report` for each sink, redact it again, and emit it.
///
/// Sinks are independent: a failure or a withheld text for one sink does
/// not stop the others.
pub async fn deliver(report: &Report, gate: &RedactionGate, sinks: &[&dyn Sink]) -> Vec<Delivery> {
    let mut deliveries = Vec::with_capacity(sinks.len());
    for sink in sinks {
        let rendered = match sink.format() {
            ReportFormat::Markdown => report.render_markdown(),
            ReportFormat::Comment => report.render_comment(),
        };
        let result = match gate.redact(&rendered) {
            Ok(redaction) => {
                if !redaction.matches.is_empty() {
                    obs::emit_redactions_applied(sink.name(), redaction.matches.len());
                }
                sink.emit(&redaction.text).await
            }
            Err(err) => Err(SinkError::Withheld(err)),
        };
        if let Err(err) = &result {
            obs::emit_sink_error(sink.name(), err);
        }
        deliveries.push(Delivery {
            sink: sink.name().to_string(),
            result,
        });
    }
    deliveries
}
