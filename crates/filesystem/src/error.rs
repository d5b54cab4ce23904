//! Error types for file system operations.

use std::path::PathBuf;

use dicom_transfer_common::PathError;
use thiserror::Error;

/// Errors from scanning and local file operations.
#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },

    #[error("IO error on {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Path(#[from] PathError),
}

impl FileSystemError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }
}
