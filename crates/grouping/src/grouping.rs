//! Partition a file list into classified groups and unclassified files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::classifier::FileClassifier;
use crate::types::GroupId;

/// Result of grouping a file list.
///
/// Every input file appears in exactly one place: one group's list or the
/// unclassified list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileGrouping {
    /// Member files per group, each list in input order.
    pub groups: BTreeMap<GroupId, Vec<PathBuf>>,
    /// Files the classifier rejected, in input order.
    pub unclassified: Vec<PathBuf>,
}

impl FileGrouping {
    /// Number of distinct groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total number of files across groups and the unclassified list.
    pub fn file_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum::<usize>() + self.unclassified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.unclassified.is_empty()
    }

    /// Member files of one group.
    pub fn files_for(&self, group_id: &GroupId) -> Option<&[PathBuf]> {
        self.groups.get(group_id).map(Vec::as_slice)
    }
}

/// Classify each file and bucket it by group.
///
/// # Arguments
/// * `files` - Files to group
/// * `classifier` - Maps a file to its group
///
/// # Returns
/// Groups keyed by id plus the unclassified remainder. An empty input yields an
/// empty grouping.
pub fn group_files<C>(files: &[PathBuf], classifier: &C) -> FileGrouping
where
    C: FileClassifier + ?Sized,
{
    let mut grouping: FileGrouping = FileGrouping::default();

    for path in files {
        match classifier.classify(path) {
            Ok(group_id) => {
                tracing::trace!(path = %path.display(), group_id = %group_id, "classified file");
                grouping
                    .groups
                    .entry(group_id)
                    .or_default()
                    .push(path.clone());
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "file left unclassified");
                grouping.unclassified.push(path.clone());
            }
        }
    }

    tracing::debug!(
        groups = grouping.group_count(),
        unclassified = grouping.unclassified.len(),
        "grouped {} files",
        files.len()
    );
    grouping
}
