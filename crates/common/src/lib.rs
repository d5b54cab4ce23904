//! Shared types and utilities for dicom-transfer.
//!
//! This crate provides common functionality used across all dicom-transfer crates:
//! - Object key derivation for studies and unclassified files
//! - Generic progress callback trait
//! - Shared constants and error types

pub mod constants;
pub mod error;
pub mod path_utils;
pub mod progress;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use path_utils::{
    file_name, format_bytes, join_key, key_basename, study_object_key, to_posix_path,
    unclassified_object_key,
};
pub use progress::{progress_fn, FnProgress, NoOpProgress, ProgressCallback};
