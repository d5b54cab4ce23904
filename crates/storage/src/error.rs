//! Error types for storage and orchestration.

use std::path::PathBuf;

use dicom_transfer_grouping::DescribeError;
use dicom_transfer_pool::{PoolError, TaskError};
use thiserror::Error;

/// Errors returned by object and metadata store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Object not found in the bucket.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// No metadata document recorded for a group.
    #[error("No document for group '{group_id}' in table {table}")]
    DocumentNotFound { table: String, group_id: String },

    /// Access denied.
    #[error("Access denied to {resource}: {message}")]
    AccessDenied { resource: String, message: String },

    /// Network or service error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Invalid configuration or unusable resource (missing table, bad key).
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    pub(crate) fn io(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        StorageError::IoError {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

/// A failed transfer of one key, kept for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferError {
    /// The key/path that failed.
    pub key: String,
    /// The error that occurred.
    pub error: StorageError,
}

impl TransferError {
    pub fn new(key: impl Into<String>, error: StorageError) -> Self {
        Self {
            key: key.into(),
            error,
        }
    }
}

/// Why a group failed before (or instead of) its file transfers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupFailure {
    /// The group descriptor could not be generated.
    #[error("descriptor generation failed: {0}")]
    Describe(#[from] DescribeError),

    /// The group descriptor could not be persisted.
    #[error("metadata write failed: {0}")]
    Metadata(StorageError),

    /// The per-group pool could not be created.
    #[error("file pool unavailable: {0}")]
    Pool(#[from] PoolError),

    /// The group task itself did not complete.
    #[error("group task did not complete: {0}")]
    Task(#[from] TaskError),
}

/// Run-level errors: nothing meaningful could be transferred.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The group has no metadata document.
    #[error("Group not found: {group_id}")]
    GroupNotFound { group_id: String },

    /// The group exists but has no recorded file locations.
    #[error("No files recorded for group: {group_id}")]
    NoFilesForGroup { group_id: String },

    /// A store call required before dispatch failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The top-level pool could not be used.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Local directory problem (scan root, output directory).
    #[error("File system error on {path}: {message}")]
    FileSystem { path: PathBuf, message: String },

    /// Blocking preparation work (scan, classification) did not complete.
    #[error("Preparation failed: {message}")]
    Preparation { message: String },
}
