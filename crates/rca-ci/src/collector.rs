//! Filesystem collector over a downloaded CI job directory.
//!
//! Expected layout:
//!
//! ```text
//! <job>/
//!   step-graph.json            optional, {"<step>": ["<dependency>", ...]}
//!   steps/<name>/finished.json {"passed": bool}
//!   steps/<name>/build-log.txt
//!   tests/*.json               arrays of failed-test records
//!   artifacts/**               supplementary text files
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use rca_core::{
    ArtifactRef, CollectorError, CollectorResult, Collector, JobInfo, Preprocessor, StepRef,
    TestRef,
};

use crate::filter::{GlobFilter, PathFilter};

/// Bytes inspected for a NUL when deciding whether an artifact is binary.
pub const BINARY_SNIFF_BYTES: usize = 8 * 1024;

const STEP_GRAPH: &str = "step-graph.json";
const FINISHED: &str = "finished.json";
const BUILD_LOG: &str = "build-log.txt";

#[derive(Debug, Deserialize)]
struct Finished {
    passed: bool,
}

/// One failed test case as written to `tests/*.json`.
#[derive(Debug, Deserialize)]
struct TestRecord {
    name: String,
    #[serde(default, alias = "class_name")]
    classname: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    failure_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "system_out")]
    stdout: Option<String>,
    #[serde(default, alias = "system_err")]
    stderr: Option<String>,
}

impl TestRecord {
    fn identifier(&self) -> String {
        match &self.classname {
            Some(class) if !class.is_empty() => format!("{class}.{}", self.name),
            _ => self.name.clone(),
        }
    }

    fn details(&self) -> String {
        let sections = [
            ("Failure Content", &self.content),
            ("System Out", &self.stdout),
            ("System Err", &self.stderr),
        ];
        let parts: Vec<String> = sections
            .iter()
            .filter_map(|(title, body)| {
                body.as_deref()
                    .filter(|b| !b.trim().is_empty())
                    .map(|b| format!("--- {title} ---\n{b}"))
            })
            .collect();
        if parts.is_empty() {
            "No additional details available".to_string()
        } else {
            parts.join("\n\n")
        }
    }

    fn into_test_ref(self, fallback_file: &str) -> TestRef {
        let mut test = TestRef::new(self.identifier(), self.details())
            .with_source_file(self.file.clone().unwrap_or_else(|| fallback_file.to_string()));
        if self.failure_type.is_some() || self.message.is_some() {
            test = test.with_failure(
                self.failure_type.clone().unwrap_or_else(|| "Failure".to_string()),
                self.message.clone().unwrap_or_else(|| "No message".to_string()),
            );
        }
        test
    }
}

/// Reads failed steps, failed tests and artifacts from a job directory.
pub struct FsCollector {
    root: PathBuf,
    ignored_steps: GlobFilter,
    preprocessor: Option<Arc<dyn Preprocessor>>,
    device_hint: Option<String>,
}

impl FsCollector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignored_steps: GlobFilter::empty(),
            preprocessor: None,
            device_hint: None,
        }
    }

    /// Skip failed steps whose name matches any of `patterns`.
    pub fn with_ignored_steps<S: AsRef<str>>(mut self, patterns: &[S]) -> crate::Result<Self> {
        self.ignored_steps = GlobFilter::new(patterns)?;
        Ok(self)
    }

    /// Condense step logs and artifact text before they are returned.
    pub fn with_preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn with_device_hint(mut self, device: impl Into<String>) -> Self {
        self.device_hint = Some(device.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self, job: &JobInfo) -> CollectorResult<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(CollectorError::JobNotFound(format!(
                "{} build {} ({})",
                job.job_name,
                job.build_id,
                self.root.display()
            )))
        }
    }

    fn condense(&self, raw: String) -> String {
        match &self.preprocessor {
            Some(p) => p.condense(&raw, self.device_hint.as_deref()),
            None => raw,
        }
    }

    async fn step_graph(&self) -> CollectorResult<BTreeMap<String, Vec<String>>> {
        let path = self.root.join(STEP_GRAPH);
        match read_optional(&path).await? {
            Some(raw) => parse_json(&path, &raw),
            None => Ok(BTreeMap::new()),
        }
    }
}

async fn read_optional(path: &Path) -> CollectorResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(path: &Path, raw: &str) -> CollectorResult<T> {
    serde_json::from_str(raw).map_err(|e| CollectorError::InvalidData {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Subdirectories or files of `dir` sorted by name; empty when `dir` is absent.
async fn sorted_entries(dir: &Path) -> CollectorResult<Vec<PathBuf>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0)
}

fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[async_trait]
impl Collector for FsCollector {
    async fn list_failed_steps(&self, job: &JobInfo) -> CollectorResult<Vec<StepRef>> {
        self.ensure_root(job)?;
        let graph = self.step_graph().await?;
        let mut steps = Vec::new();

        for dir in sorted_entries(&self.root.join("steps")).await? {
            if !dir.is_dir() {
                continue;
            }
            let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let finished_path = dir.join(FINISHED);
            let Some(raw) = read_optional(&finished_path).await? else {
                debug!(step = %name, "no finished.json, skipping");
                continue;
            };
            let finished: Finished = parse_json(&finished_path, &raw)?;
            if finished.passed {
                continue;
            }
            if self.ignored_steps.is_match(&name) {
                info!(step = %name, "ignoring failed step (filtered)");
                continue;
            }

            let log = match read_optional(&dir.join(BUILD_LOG)).await? {
                Some(log) => log,
                None => {
                    warn!(step = %name, "failed step has no build log");
                    String::new()
                }
            };
            let dependencies = graph.get(&name).cloned().unwrap_or_default();
            steps.push(StepRef::new(name, self.condense(log)).with_dependencies(dependencies));
        }

        info!(count = steps.len(), "failed steps");
        Ok(steps)
    }

    async fn list_failed_tests(&self, job: &JobInfo) -> CollectorResult<Vec<TestRef>> {
        self.ensure_root(job)?;
        let mut tests = Vec::new();

        for path in sorted_entries(&self.root.join("tests")).await? {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = tokio::fs::read_to_string(&path).await?;
            let records: Vec<TestRecord> = parse_json(&path, &raw)?;
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            tests.extend(records.into_iter().map(|r| r.into_test_ref(&file)));
        }

        info!(count = tests.len(), "failed tests");
        Ok(tests)
    }

    async fn list_included_artifacts(
        &self,
        job: &JobInfo,
        include: &[String],
        exclude: &[String],
    ) -> CollectorResult<Vec<ArtifactRef>> {
        self.ensure_root(job)?;
        let filter = PathFilter::new(include, exclude).map_err(|e| CollectorError::InvalidData {
            path: "artifact patterns".to_string(),
            message: e.to_string(),
        })?;
        if filter.selects_nothing() {
            return Ok(Vec::new());
        }

        let base = self.root.join("artifacts");
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        let (mut checked, mut binary) = (0usize, 0usize);
        for entry in WalkDir::new(&base).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative_slash_path(&base, entry.path()) else {
                continue;
            };
            checked += 1;
            if !filter.allows(&rel) {
                continue;
            }
            let bytes = tokio::fs::read(entry.path()).await?;
            if is_binary(&bytes) {
                binary += 1;
                debug!(path = %rel, "skipping binary artifact");
                continue;
            }
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if text.trim().is_empty() {
                continue;
            }
            artifacts.push(ArtifactRef::new(rel, self.condense(text)));
        }

        if artifacts.is_empty() && checked > 0 {
            warn!(patterns = %include.join(","), checked, "no artifacts matched");
        }
        info!(count = artifacts.len(), checked, binary, "included artifacts");
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_detection_looks_at_prefix_only() {
        assert!(is_binary(b"PK\x03\x04\x00rest"));
        assert!(!is_binary(b"plain text"));

        let mut late_nul = vec![b'a'; BINARY_SNIFF_BYTES];
        late_nul.push(0);
        assert!(!is_binary(&late_nul));
    }

    #[test]
    fn test_test_record_identifier_and_details() {
        let record: TestRecord = serde_json::from_str(
            r#"{"name": "reconciles", "classname": "Controller", "message": "boom",
                "content": "stack", "stdout": ""}"#,
        )
        .unwrap();
        assert_eq!(record.identifier(), "Controller.reconciles");
        assert_eq!(record.details(), "--- Failure Content ---\nstack");

        let test = record.into_test_ref("junit.json");
        assert_eq!(test.source_file.as_deref(), Some("junit.json"));
        assert_eq!(test.failure_type.as_deref(), Some("Failure"));
        assert_eq!(test.failure_message.as_deref(), Some("boom"));
    }
}
