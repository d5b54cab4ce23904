//! File classification capability.

use std::path::Path;

use crate::error::ClassificationError;
use crate::types::GroupId;

/// Maps a file to the group it belongs to.
///
/// Implementations may read the file (for example a header) but must not have
/// side effects visible to the orchestration. A failure means "unclassified",
/// never "abort the run".
pub trait FileClassifier: Send + Sync {
    /// Classify a single file.
    ///
    /// # Arguments
    /// * `path` - File to classify
    ///
    /// # Returns
    /// The file's group identifier.
    ///
    /// # Errors
    /// Returns a `ClassificationError` if the file is not recognized, has no
    /// group identifier, or cannot be read.
    fn classify(&self, path: &Path) -> Result<GroupId, ClassificationError>;
}

impl<F> FileClassifier for F
where
    F: Fn(&Path) -> Result<GroupId, ClassificationError> + Send + Sync,
{
    fn classify(&self, path: &Path) -> Result<GroupId, ClassificationError> {
        self(path)
    }
}
