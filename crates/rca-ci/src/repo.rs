//! Repository inference from CI job names.

use crate::sinks::normalize_repo;

const BRANCH_INDICATORS: &[&str] = &["-main-", "-master-", "-release-", "-develop-"];

/// Infer `org/repo` from a job name such as
/// `pull-ci-acme-widgets-main-e2e-aws`.
///
/// The org/repo section sits between the `pull-ci-` (or `periodic-ci-`)
/// prefix and the first branch indicator. It is split at its first dash, so
/// orgs containing dashes need an explicit override.
pub fn infer_org_repo(job_name: &str) -> Option<String> {
    let mut parts: Vec<&str> = job_name.split('-').collect();
    if parts.first() == Some(&"rehearse") {
        parts.drain(..parts.len().min(2));
    }
    if parts.len() < 5 || !matches!(parts[0], "pull" | "periodic") || parts[1] != "ci" {
        return None;
    }

    let after_prefix = parts[2..].join("-");
    let section = BRANCH_INDICATORS
        .iter()
        .find_map(|indicator| after_prefix.split_once(indicator).map(|(head, _)| head))?;
    let (org, repo) = section.split_once('-')?;
    if org.is_empty() || repo.is_empty() {
        return None;
    }
    Some(format!("{org}/{repo}"))
}

/// An explicit `org/repo` (or `org_repo`) wins; otherwise infer from the job.
pub fn resolve_org_repo(explicit: Option<&str>, job_name: &str) -> Option<String> {
    match explicit.filter(|s| !s.trim().is_empty()) {
        Some(explicit) => normalize_repo(explicit),
        None => infer_org_repo(job_name),
    }
}
