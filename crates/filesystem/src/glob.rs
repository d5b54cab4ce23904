//! Glob pattern matching for file filtering.
//!
//! Patterns use `globset` syntax (`**`, `*.{dcm,DCM}`, `[abc]`) and are matched
//! against POSIX-style paths relative to the scan root.

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::FileSystemError;

/// Include/exclude filter applied while scanning.
///
/// An empty include list includes everything. Exclusion wins over inclusion.
#[derive(Debug, Clone, Default)]
pub struct GlobFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    include_set: Option<GlobSet>,
    exclude_set: Option<GlobSet>,
}

impl GlobFilter {
    /// Create a filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter with include patterns only.
    ///
    /// # Errors
    /// Returns `InvalidGlobPattern` if any pattern is invalid.
    pub fn include(patterns: Vec<String>) -> Result<Self, FileSystemError> {
        Self::with_patterns(patterns, Vec::new())
    }

    /// Create a filter with exclude patterns only.
    ///
    /// # Errors
    /// Returns `InvalidGlobPattern` if any pattern is invalid.
    pub fn exclude(patterns: Vec<String>) -> Result<Self, FileSystemError> {
        Self::with_patterns(Vec::new(), patterns)
    }

    /// Create a filter with both include and exclude patterns.
    ///
    /// # Arguments
    /// * `include` - Patterns a path must match (any of); empty means all
    /// * `exclude` - Patterns a path must not match
    ///
    /// # Errors
    /// Returns `InvalidGlobPattern` if any pattern is invalid.
    pub fn with_patterns(
        include: Vec<String>,
        exclude: Vec<String>,
    ) -> Result<Self, FileSystemError> {
        let include_set: Option<GlobSet> = compile(&include)?;
        let exclude_set: Option<GlobSet> = compile(&exclude)?;
        Ok(Self {
            include,
            exclude,
            include_set,
            exclude_set,
        })
    }

    /// Check a relative POSIX path against the filter.
    pub fn matches(&self, path: &str) -> bool {
        let included: bool = self
            .include_set
            .as_ref()
            .map_or(true, |set: &GlobSet| set.is_match(path));
        let excluded: bool = self
            .exclude_set
            .as_ref()
            .map_or(false, |set: &GlobSet| set.is_match(path));
        included && !excluded
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn include_patterns(&self) -> &[String] {
        &self.include
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude
    }
}

fn compile(patterns: &[String]) -> Result<Option<GlobSet>, FileSystemError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder: GlobSetBuilder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob: Glob = Glob::new(pattern).map_err(|e| FileSystemError::InvalidGlobPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    let set: GlobSet = builder
        .build()
        .map_err(|e| FileSystemError::InvalidGlobPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;
    Ok(Some(set))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let filter: GlobFilter = GlobFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches("series1/IM0001"));
        assert!(filter.matches("README.txt"));
    }

    #[test]
    fn test_include_extension_any_depth() {
        let filter: GlobFilter = GlobFilter::include(strings(&["**/*.{dcm,DCM}"])).unwrap();
        assert!(filter.matches("a.dcm"));
        assert!(filter.matches("study/series/b.DCM"));
        assert!(!filter.matches("study/notes.txt"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter: GlobFilter =
            GlobFilter::with_patterns(strings(&["**/*"]), strings(&["**/DICOMDIR", "**/.*"]))
                .unwrap();
        assert!(filter.matches("study/IM0001"));
        assert!(!filter.matches("DICOMDIR"));
        assert!(!filter.matches("study/DICOMDIR"));
        assert!(!filter.matches("study/.DS_Store"));
    }

    #[test]
    fn test_exclude_directory_subtree() {
        let filter: GlobFilter = GlobFilter::exclude(strings(&["tmp/**"])).unwrap();
        assert!(!filter.matches("tmp/a.dcm"));
        assert!(filter.matches("keep/tmp.dcm"));
        assert_eq!(filter.exclude_patterns(), &["tmp/**".to_string()]);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = GlobFilter::include(strings(&["[invalid"])).unwrap_err();
        assert!(
            matches!(err, FileSystemError::InvalidGlobPattern { ref pattern, .. } if pattern == "[invalid")
        );
    }
}
