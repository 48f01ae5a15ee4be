//! ci-rca - CI failure root-cause analysis CLI
//!
//! ## Commands
//!
//! - `analyze`: collect a job directory, analyse failures, print the report
//! - `plan`: dry run that prints the token budget without calling a model
//! - `redact`: scrub secrets from a file or stdin

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use rca_ci::{
    resolve_org_repo, split_patterns, ConsoleSink, FsCollector, GithubCommentSink, HttpConfig,
    HttpTransport, TailCondenser,
};
use rca_core::obs::RunSpan;
use rca_core::telemetry::init_tracing;
use rca_core::{
    context_window_for, deliver, plan, AnalysisConfig, BudgetConfig, CollectedJob, JobInfo,
    Pipeline, PipelineError, RedactionGate, Report, Sink,
};

#[derive(Parser)]
#[command(name = "ci-rca")]
#[command(author = "Stevedores Org")]
#[command(version = rca_core::VERSION)]
#[command(about = "Budgeted, redacted root-cause analysis for CI failures", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Analysis settings file (TOML)
    #[arg(long, global = true, env = "RCA_CONFIG")]
    config: Option<PathBuf>,

    /// Override the model context window (tokens)
    #[arg(long, global = true, env = "RCA_CONTEXT_WINDOW")]
    context_window: Option<u64>,

    /// Model name; also sizes the window when no override or config is given
    #[arg(long, global = true, env = "LLM_MODEL")]
    llm_model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a failed job and print the root-cause report
    Analyze {
        #[command(flatten)]
        job: JobArgs,

        /// Pull request number for PR-triggered jobs
        #[arg(long, env = "PULL_NUMBER")]
        pr_number: Option<u64>,

        /// Override org/repo (format: org/repo or org_repo)
        #[arg(long, env = "ORG_REPO")]
        org_repo: Option<String>,

        /// OpenAI-compatible API base URL
        #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
        llm_base_url: String,

        /// Model API key
        #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
        llm_api_key: Option<String>,

        /// GitHub token, required with --post-comment
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,

        /// Post the report as a comment on the originating PR
        #[arg(long)]
        post_comment: bool,
    },

    /// Collect and allocate without calling a model; prints the budget as JSON
    Plan {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Redact secrets from a file (or stdin) and print the result
    Redact {
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct JobArgs {
    /// Downloaded job directory
    #[arg(long, env = "JOB_DIR")]
    job_dir: PathBuf,

    /// CI job name
    #[arg(long, env = "JOB_NAME")]
    job_name: Option<String>,

    /// Build ID
    #[arg(long, env = "BUILD_ID")]
    build_id: Option<String>,

    /// Comma-separated globs of failed steps to ignore
    #[arg(long, env = "IGNORED_STEPS", default_value = "")]
    ignored_steps: String,

    /// Comma-separated globs of artifacts to include
    #[arg(long, env = "INCLUDED_ARTIFACTS", default_value = "")]
    included_artifacts: String,

    /// Comma-separated globs of artifacts to exclude
    #[arg(long, env = "EXCLUDED_ARTIFACTS", default_value = "")]
    excluded_artifacts: String,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Collect every missing required setting rather than failing on the first.
fn missing_settings(
    job: &JobArgs,
    llm: Option<(&Option<String>, &Option<String>)>,
    comment: Option<&Option<String>>,
) -> Vec<&'static str> {
    let mut errors = Vec::new();
    if present(&job.job_name).is_none() {
        errors.push("JOB_NAME is required");
    }
    if present(&job.build_id).is_none() {
        errors.push("BUILD_ID is required");
    }
    if let Some((model, key)) = llm {
        if present(model).is_none() {
            errors.push("LLM_MODEL is required");
        }
        if present(key).is_none() {
            errors.push("LLM_API_KEY is required");
        }
    }
    if let Some(token) = comment {
        if present(token).is_none() {
            errors.push("GITHUB_TOKEN is required when --post-comment is enabled");
        }
    }
    errors
}

fn load_config(
    path: Option<&Path>,
    context_window: Option<u64>,
    model: Option<&str>,
) -> Result<AnalysisConfig> {
    let mut config = match path {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    match (context_window, model) {
        (Some(window), _) if path.is_some() => config.budget.context_window = window,
        (Some(window), _) => config.budget = BudgetConfig::for_window(window),
        (None, Some(model)) if path.is_none() => {
            config.budget = BudgetConfig::for_window(context_window_for(model));
        }
        (None, _) => {}
    }
    config.validate()?;
    Ok(config)
}

async fn collect(job: &JobArgs, info: &JobInfo, config: &AnalysisConfig) -> Result<CollectedJob> {
    // Condensed logs target a fifth of the window, leaving room for the rest.
    let condenser = TailCondenser::new(config.budget.context_window / 5);
    let collector = FsCollector::new(&job.job_dir)
        .with_ignored_steps(&split_patterns(&job.ignored_steps))?
        .with_preprocessor(Arc::new(condenser));

    let collected = CollectedJob::collect(
        &collector,
        info,
        &split_patterns(&job.included_artifacts),
        &split_patterns(&job.excluded_artifacts),
    )
    .await
    .with_context(|| format!("Failed to collect job data from {}", job.job_dir.display()))?;
    Ok(collected)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let llm_model = cli.llm_model;
    let config = load_config(
        cli.config.as_deref(),
        cli.context_window,
        present(&llm_model),
    )?;

    match cli.command {
        Commands::Analyze {
            job,
            pr_number,
            org_repo,
            llm_base_url,
            llm_api_key,
            github_token,
            post_comment,
        } => {
            let errors = missing_settings(
                &job,
                Some((&llm_model, &llm_api_key)),
                post_comment.then_some(&github_token),
            );
            if !errors.is_empty() {
                bail!("Configuration validation failed:\n  - {}", errors.join("\n  - "));
            }
            let transport = HttpTransport::new(HttpConfig::new(
                &llm_base_url,
                present(&llm_model).unwrap_or_default(),
                present(&llm_api_key).unwrap_or_default(),
            ))?;
            let comment = if post_comment {
                present(&github_token).map(str::to_string)
            } else {
                None
            };
            cmd_analyze(&config, &job, pr_number, org_repo.as_deref(), &transport, comment).await
        }
        Commands::Plan { job } => {
            let errors = missing_settings(&job, None, None);
            if !errors.is_empty() {
                bail!("Configuration validation failed:\n  - {}", errors.join("\n  - "));
            }
            cmd_plan(&config, &job).await
        }
        Commands::Redact { file } => cmd_redact(&config, file.as_deref()),
    }
}

fn job_info(job: &JobArgs, pr_number: Option<u64>, org_repo: Option<&str>) -> JobInfo {
    let job_name = present(&job.job_name).unwrap_or_default();
    let mut info = JobInfo::new(job_name, present(&job.build_id).unwrap_or_default());
    if let Some(pr) = pr_number {
        info = info.with_pr(pr);
    }
    match resolve_org_repo(org_repo, job_name) {
        Some(repo) => {
            info!("Using org/repo: {}", repo);
            info = info.with_org_repo(repo);
        }
        None if pr_number.is_some() => warn!("Could not infer org/repo from {}", job_name),
        None => {}
    }
    info
}

/// Analyze a job directory and deliver the report
async fn cmd_analyze(
    config: &AnalysisConfig,
    job: &JobArgs,
    pr_number: Option<u64>,
    org_repo: Option<&str>,
    transport: &HttpTransport,
    github_token: Option<String>,
) -> Result<()> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let _span = RunSpan::enter(&run_id);

    let info = job_info(job, pr_number, org_repo);
    info!("Analyzing job: {}, Build: {}", info.job_name, info.build_id);

    let collected = collect(job, &info, config).await?;
    if collected.has_no_failures() {
        info!("No failed steps or tests found");
        println!("\nJob completed successfully - no failures to analyze.");
        return Ok(());
    }

    let gate = RedactionGate::new(&config.redaction)?;
    let console = ConsoleSink::new();
    let github = match (&github_token, info.pr_number, info.org_repo.as_deref()) {
        (Some(token), Some(pr), Some(repo)) => Some(GithubCommentSink::new(token, repo, pr)?),
        (Some(_), _, _) => {
            warn!("Cannot post PR comment: missing PR number or org/repo");
            None
        }
        _ => None,
    };
    let mut sinks: Vec<&dyn Sink> = vec![&console];
    if let Some(github) = &github {
        sinks.push(github);
    }

    let outcome = Pipeline::new(transport, &gate, config)
        .run(info, &collected)
        .await;
    let (report, terminal) = match outcome {
        Ok(report) => (report, None),
        Err(PipelineError::NoUsableOutput { report }) => {
            (*report, Some("no item analysis or synthesis succeeded"))
        }
        Err(err) => return Err(err).context("Analysis failed"),
    };

    // A terminal report is shown locally but never posted.
    let targets: &[&dyn Sink] = if terminal.is_some() { &sinks[..1] } else { &sinks[..] };
    deliver_all(&report, &gate, targets).await?;

    if let Some(reason) = terminal {
        bail!("Analysis failed: {reason}");
    }
    Ok(())
}

async fn deliver_all(report: &Report, gate: &RedactionGate, sinks: &[&dyn Sink]) -> Result<()> {
    let mut failed = Vec::new();
    for delivery in deliver(report, gate, sinks).await {
        if let Err(err) = delivery.result {
            failed.push(format!("{}: {}", delivery.sink, err));
        }
    }
    if !failed.is_empty() {
        bail!("Failed to deliver report: {}", failed.join("; "));
    }
    Ok(())
}

/// Print the batching and budget allocation for a job without model calls
async fn cmd_plan(config: &AnalysisConfig, job: &JobArgs) -> Result<()> {
    let info = job_info(job, None, None);
    let collected = collect(job, &info, config).await?;
    println!("{}", render_plan(config, &collected)?);
    Ok(())
}

fn render_plan(config: &AnalysisConfig, collected: &CollectedJob) -> Result<String> {
    let collected = collected.with_unique_keys();
    let plan = plan(&collected, config);
    let summary = serde_json::json!({
        "items": plan.items.len(),
        "steps": collected.steps.len(),
        "tests": collected.tests.len(),
        "artifacts": collected.artifacts.len(),
        "artifact_batches": plan.artifact_batches(),
        "budget": plan.budget,
    });
    let gate = RedactionGate::new(&config.redaction)?;
    let text = gate.clean(&serde_json::to_string_pretty(&summary)?)?;
    Ok(text.into_string())
}

/// Redact a file or stdin to stdout; a per-kind summary goes to stderr
fn cmd_redact(config: &AnalysisConfig, file: Option<&Path>) -> Result<()> {
    let input = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let (text, counts) = redact_text(config, &input)?;
    print!("{}", text);
    if counts.is_empty() {
        eprintln!("No secrets found");
    }
    for (kind, count) in counts {
        eprintln!("{:>4}  {}", count, kind);
    }
    Ok(())
}

fn redact_text(config: &AnalysisConfig, input: &str) -> Result<(String, BTreeMap<String, usize>)> {
    let gate = RedactionGate::new(&config.redaction)?;
    let redaction = gate.redact(input)?;
    let mut counts = BTreeMap::new();
    for m in &redaction.matches {
        *counts.entry(m.kind.clone()).or_insert(0) += 1;
    }
    Ok((redaction.text.into_string(), counts))
}
