//! Path and object key utilities.
//!
//! Object keys are always POSIX style (`/` separated) regardless of the host OS.
//! Member files are addressed by `(group id, file name)`, so two files with the same
//! name in one group map to the same key; the last upload wins.

use std::path::{Component, Path};

use crate::constants::{STUDY_KEY_PREFIX, UNCLASSIFIED_KEY_PREFIX};
use crate::error::PathError;

/// Extract the final file name component of a local path.
///
/// # Arguments
/// * `path` - Local file path
///
/// # Returns
/// The file name as a UTF-8 string (lossy for non UTF-8 names).
///
/// # Errors
/// Returns `MissingFileName` if the path ends in `..` or is a root.
pub fn file_name(path: &Path) -> Result<String, PathError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| PathError::MissingFileName {
            path: path.display().to_string(),
        })
}

/// Join key segments with `/`, skipping empty segments and stray separators.
///
/// # Arguments
/// * `segments` - Key segments in order
///
/// # Returns
/// A POSIX-style object key.
pub fn join_key(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s: &&str| s.trim_matches('/'))
        .filter(|s: &&str| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the object key for a study member.
///
/// Returns: `"studies/{group_id}/{file name}"`
///
/// # Errors
/// Returns error if the path has no file name.
pub fn study_object_key(group_id: &str, path: &Path) -> Result<String, PathError> {
    let name: String = file_name(path)?;
    Ok(join_key(&[STUDY_KEY_PREFIX, group_id, &name]))
}

/// Build the object key for a file that belongs to no group.
///
/// Returns: `"unclassified/{run_id}/{file name}"`
///
/// # Errors
/// Returns error if the path has no file name.
pub fn unclassified_object_key(run_id: &str, path: &Path) -> Result<String, PathError> {
    let name: String = file_name(path)?;
    Ok(join_key(&[UNCLASSIFIED_KEY_PREFIX, run_id, &name]))
}

/// Last segment of an object key, used as the local file name on download.
///
/// # Errors
/// Returns `InvalidPath` when the basename is empty or a relative directory
/// reference, which would escape or alias the output directory.
pub fn key_basename(key: &str) -> Result<&str, PathError> {
    let base: &str = key.rsplit('/').next().unwrap_or_default();
    if base.is_empty() || base == "." || base == ".." || base.contains('\\') {
        return Err(PathError::InvalidPath {
            path: key.to_string(),
        });
    }
    Ok(base)
}

/// Convert a path to POSIX-style string (forward slashes).
///
/// # Arguments
/// * `path` - Path to convert
///
/// # Returns
/// String with forward slashes as separators.
pub fn to_posix_path(path: &Path) -> String {
    path.components()
        .filter(|c: &Component| !matches!(c, Component::CurDir))
        .map(|c: Component| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Render a byte count for humans, e.g. `1.50 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size: f64 = bytes as f64;
    let mut unit: usize = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", size, UNITS[unit])
}
