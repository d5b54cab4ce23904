//! Group metadata document generation.

use std::path::PathBuf;

use crate::error::DescribeError;
use crate::types::GroupId;

/// Metadata document stored for a group: a JSON object.
pub type GroupDocument = serde_json::Map<String, serde_json::Value>;

/// Produces the metadata document persisted for a group before any of its
/// files are transferred.
pub trait GroupDescriber: Send + Sync {
    /// Describe a group from its member files.
    ///
    /// # Arguments
    /// * `group_id` - Group being described
    /// * `files` - Member files, in grouping order
    ///
    /// # Errors
    /// Returns a `DescribeError` when no document can be produced. The group
    /// is then failed without transferring any file.
    fn describe(&self, group_id: &GroupId, files: &[PathBuf]) -> Result<GroupDocument, DescribeError>;
}
