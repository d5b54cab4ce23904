//! Error types for classification and description.

use std::path::PathBuf;

use thiserror::Error;

/// A string that cannot be used as a group identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid group id '{value}': {reason}")]
pub struct InvalidGroupId {
    pub value: String,
    pub reason: &'static str,
}

/// Reasons a file could not be assigned to a group.
///
/// Classification failures are never fatal to a run; the file is routed to the
/// unclassified bucket instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    /// The file is not a member of the managed file family.
    #[error("File not recognized: {path}: {reason}")]
    NotRecognized { path: PathBuf, reason: String },

    /// The file was recognized but carries no usable group identifier.
    #[error("No group identifier in {path}")]
    MissingGroupId { path: PathBuf },

    /// The file could not be read.
    #[error("IO error reading {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl ClassificationError {
    /// Path of the file that failed classification.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::NotRecognized { path, .. } => path,
            Self::MissingGroupId { path } => path,
            Self::Io { path, .. } => path,
        }
    }
}

/// Failure to generate a group's metadata document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescribeError {
    /// Group has no member files to describe.
    #[error("Group '{group_id}' has no files to describe")]
    EmptyGroup { group_id: String },

    /// A member file could not be read or parsed.
    #[error("Failed to describe {path} in group '{group_id}': {message}")]
    InvalidMember {
        group_id: String,
        path: PathBuf,
        message: String,
    },
}
