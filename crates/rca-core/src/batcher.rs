//! First-fit-decreasing packing of artifacts into analysis batches.

use tracing::debug;

use crate::domain::item::{ArtifactBatch, ArtifactRef, BatchMember};

/// Pack `artifacts` into batches whose combined size stays within `ceiling`.
///
/// Artifacts are placed largest first (path order on ties) into the first
/// batch with room. An artifact larger than the ceiling gets a batch of its
/// own and is marked truncated to the ceiling. Batch ids are assigned in
/// creation order: `artifacts-001`, `artifacts-002`, ...
pub fn batch_artifacts(artifacts: &[ArtifactRef], ceiling: u64) -> Vec<ArtifactBatch<'_>> {
    let mut ordered: Vec<&ArtifactRef> = artifacts.iter().collect();
    ordered.sort_by(|a, b| {
        b.size_tokens
            .cmp(&a.size_tokens)
            .then_with(|| a.path.cmp(&b.path))
    });

    let mut bins: Vec<(u64, Vec<BatchMember<'_>>)> = Vec::new();
    for artifact in ordered {
        if artifact.size_tokens > ceiling {
            debug!(
                path = %artifact.path,
                size_tokens = artifact.size_tokens,
                ceiling,
                "oversize artifact truncated into its own batch"
            );
            bins.push((
                ceiling,
                vec![BatchMember {
                    artifact,
                    size_tokens: ceiling,
                    truncated: true,
                }],
            ));
            continue;
        }

        let member = BatchMember {
            artifact,
            size_tokens: artifact.size_tokens,
            truncated: false,
        };
        match bins
            .iter_mut()
            .find(|(used, _)| ceiling - *used >= artifact.size_tokens)
        {
            Some((used, members)) => {
                *used += artifact.size_tokens;
                members.push(member);
            }
            None => bins.push((artifact.size_tokens, vec![member])),
        }
    }

    bins.into_iter()
        .enumerate()
        .map(|(i, (_, members))| ArtifactBatch {
            id: format!("artifacts-{:03}", i + 1),
            members,
        })
        .collect()
}
