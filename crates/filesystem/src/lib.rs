//! File system operations for dicom-transfer.
//!
//! - `scan_files()` - Directory walking with recursion and glob filtering
//! - `GlobFilter` - Include/exclude pattern matching
//! - `ensure_directory()` - Output directory creation

pub mod error;
pub mod files;
pub mod glob;
pub mod scanner;

pub use error::FileSystemError;
pub use files::ensure_directory;
pub use glob::GlobFilter;
pub use scanner::{scan_files, ScanOptions, ScanProgress};
