//! Store capabilities consumed by the orchestrators.

use std::path::Path;

use async_trait::async_trait;
use dicom_transfer_common::ProgressCallback;
use dicom_transfer_grouping::{GroupDocument, GroupId};

use crate::error::StorageError;
use crate::types::TransferProgress;

/// Information about an object from list operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub last_modified: Option<i64>,
    /// ETag, if the backend reports one.
    pub etag: Option<String>,
}

/// Remote object store. Implementations must be safe for concurrent use.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Size of an object, or `None` if it does not exist.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, StorageError>;

    /// Upload bytes. Returns the number of bytes written.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<u64, StorageError>;

    /// Upload a local file. Returns the number of bytes written.
    ///
    /// `progress` receives monotonically increasing byte counts for this
    /// transfer.
    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<u64, StorageError>;

    /// Download an object to memory.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Download an object to a local file. Returns the number of bytes written.
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<u64, StorageError>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// List every object under a prefix, following pagination to the end.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError>;
}

/// Key-value store of group documents and member locations.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Make sure the table exists and is usable. Idempotent; may wait.
    async fn ensure_table(&self, table: &str) -> Result<(), StorageError>;

    /// Store (or replace) a group's document. Recorded locations are kept.
    async fn put_group_document(
        &self,
        table: &str,
        group_id: &GroupId,
        document: &GroupDocument,
    ) -> Result<(), StorageError>;

    /// Fetch a group's document.
    ///
    /// # Errors
    /// Returns `DocumentNotFound` if the group has no document.
    async fn get_group_document(
        &self,
        table: &str,
        group_id: &GroupId,
    ) -> Result<GroupDocument, StorageError>;

    /// Add a location to the group's location set. Appending an existing
    /// location is a no-op.
    async fn append_location(
        &self,
        table: &str,
        group_id: &GroupId,
        location: &str,
    ) -> Result<(), StorageError>;

    /// Every recorded location of a group; empty if none.
    async fn get_locations(&self, table: &str, group_id: &GroupId) -> Result<Vec<String>, StorageError>;
}
