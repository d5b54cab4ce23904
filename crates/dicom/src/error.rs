//! Error types for DICOM reading.

use std::path::PathBuf;

use thiserror::Error;

/// Problems reported while decoding a DICOM file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The preamble, `DICM` prefix or file meta group is missing or invalid.
    #[error("Not a DICOM Part-10 file: {message}")]
    NotDicom { message: String },

    /// The dataset is truncated, malformed or in an unsupported encoding.
    #[error("Malformed dataset: {message}")]
    Malformed { message: String },
}

/// Errors returned by the DICOM file operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DicomError {
    #[error("IO error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// A tag key string that is not of the form `gggg,eeee`.
    #[error("Invalid DICOM tag format: {value}")]
    InvalidTag { value: String },

    #[error("Failed to write descriptor {path}: {message}")]
    Descriptor { path: PathBuf, message: String },
}

impl DicomError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
