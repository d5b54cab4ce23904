//! Local directory helper used by downloads.

use std::path::Path;

use crate::error::FileSystemError;

/// Create a directory (and parents) if it does not exist.
///
/// # Errors
/// Returns `NotADirectory` if the path exists but is not a directory, or
/// `IoError` if creation fails.
pub fn ensure_directory(path: &Path) -> Result<(), FileSystemError> {
    if path.exists() && !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    std::fs::create_dir_all(path).map_err(|e| FileSystemError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directory_creates_nested() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out/studies/1.2.3");
        ensure_directory(&target).unwrap();
        assert!(target.is_dir());
        // Second call is a no-op.
        ensure_directory(&target).unwrap();
    }

    #[test]
    fn test_ensure_directory_rejects_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            ensure_directory(&file),
            Err(FileSystemError::NotADirectory { .. })
        ));
    }
}
