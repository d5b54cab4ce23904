//! Directory scanning.

use std::path::{Path, PathBuf};

use dicom_transfer_common::{to_posix_path, ProgressCallback};
use walkdir::WalkDir;

use crate::error::FileSystemError;
use crate::glob::GlobFilter;

/// Options for scanning a directory for input files.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Directory to scan.
    pub root: PathBuf,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Follow symlinks (false = skip them).
    pub follow_symlinks: bool,
    /// Include/exclude patterns, matched against paths relative to `root`.
    pub filter: GlobFilter,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            recursive: true,
            follow_symlinks: false,
            filter: GlobFilter::default(),
        }
    }
}

impl ScanOptions {
    /// Recursive scan of `root` with no filter.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_follow_symlinks(mut self, follow_symlinks: bool) -> Self {
        self.follow_symlinks = follow_symlinks;
        self
    }

    pub fn with_filter(mut self, filter: GlobFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Progress update emitted for each accepted file.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub files_found: u64,
    pub current_path: PathBuf,
}

/// List the regular files under a directory.
///
/// # Arguments
/// * `options` - Root, recursion, symlink policy and filter
/// * `progress` - Optional callback invoked for each accepted file
///
/// # Returns
/// Matching files, ordered by path.
///
/// # Errors
/// Returns `NotADirectory` if the root is missing or not a directory, or
/// `IoError` if part of the tree cannot be read.
pub fn scan_files(
    options: &ScanOptions,
    progress: Option<&dyn ProgressCallback<ScanProgress>>,
) -> Result<Vec<PathBuf>, FileSystemError> {
    let root: &Path = &options.root;
    if !root.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let mut walker: WalkDir = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name()
        .min_depth(1);
    if !options.recursive {
        walker = walker.max_depth(1);
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in walker {
        let entry: walkdir::DirEntry = entry.map_err(|e| {
            let path: PathBuf = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            let source: std::io::Error = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("symlink loop"));
            FileSystemError::io(path, source)
        })?;

        if entry.path_is_symlink() && !options.follow_symlinks {
            tracing::debug!(path = %entry.path().display(), "skipping symlink");
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        if !options.filter.is_empty() {
            let relative: &Path = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if !options.filter.matches(&to_posix_path(relative)) {
                continue;
            }
        }

        files.push(entry.into_path());
        if let Some(cb) = progress {
            if let Some(last) = files.last() {
                cb.on_progress(&ScanProgress {
                    files_found: files.len() as u64,
                    current_path: last.clone(),
                });
            }
        }
    }

    files.sort();
    tracing::info!(root = %root.display(), files = files.len(), "scanned directory");
    Ok(files)
}
