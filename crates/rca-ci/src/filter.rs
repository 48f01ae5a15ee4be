//! Glob filters for step names and artifact paths.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{CiError, Result};

/// Split a comma-separated pattern list, dropping blanks.
pub fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// A compiled set of glob patterns.
///
/// `*` does not cross `/`, so `pods/*` matches `pods/a.txt` but not
/// `pods/x/a.txt`. Use `**` to descend.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    set: GlobSet,
    patterns: Vec<String>,
}

impl GlobFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| CiError::InvalidGlob {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }
        let set = builder.build().map_err(|e| CiError::InvalidGlob {
            pattern: kept.join(","),
            message: e.to_string(),
        })?;
        Ok(Self {
            set,
            patterns: kept,
        })
    }

    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.set.is_match(candidate)
    }
}

/// Include/exclude pair for artifact selection.
///
/// Artifacts are opt-in: with no include patterns nothing is selected.
/// Exclusion wins over inclusion.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobFilter,
    exclude: GlobFilter,
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: GlobFilter::new(include)?,
            exclude: GlobFilter::new(exclude)?,
        })
    }

    pub fn selects_nothing(&self) -> bool {
        self.include.is_empty()
    }

    pub fn allows(&self, path: &str) -> bool {
        self.include.is_match(path) && !self.exclude.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_patterns_drops_blanks() {
        assert_eq!(
            split_patterns(" pods/*, ,events.json,"),
            vec!["pods/*".to_string(), "events.json".to_string()]
        );
        assert!(split_patterns("").is_empty());
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let filter = GlobFilter::new(&["pods/*"]).unwrap();
        assert!(filter.is_match("pods/a.txt"));
        assert!(!filter.is_match("pods/nested/a.txt"));

        let deep = GlobFilter::new(&["pods/**"]).unwrap();
        assert!(deep.is_match("pods/nested/a.txt"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = PathFilter::new(&["logs/**"], &["**/*.gz.txt"]).unwrap();
        assert!(filter.allows("logs/kubelet.txt"));
        assert!(!filter.allows("logs/old.gz.txt"));
        assert!(!filter.allows("other/kubelet.txt"));
    }

    #[test]
    fn test_no_include_selects_nothing() {
        let filter = PathFilter::new::<&str>(&[], &[]).unwrap();
        assert!(filter.selects_nothing());
        assert!(!filter.allows("anything.txt"));
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let err = GlobFilter::new(&["pods/[a"]).unwrap_err();
        assert!(matches!(err, CiError::InvalidGlob { .. }));
    }
}
