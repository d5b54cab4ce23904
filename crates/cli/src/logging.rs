//! Console and file logging.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Directive used when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber: human-readable output on stderr and a
/// plain-text log file written from a background thread.
///
/// The returned guard flushes the file writer when dropped; hold it until
/// the process exits.
///
/// # Errors
/// Returns an error if the log file path has no file name or the file
/// cannot be opened.
pub fn init(verbose: bool, log_file: &Path) -> anyhow::Result<WorkerGuard> {
    let file_name = log_file
        .file_name()
        .with_context(|| format!("log file {} has no file name", log_file.display()))?;
    let log_dir: &Path = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let appender: RollingFileAppender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(log_dir)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter(verbose)),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_filter(filter(verbose)),
        );

    if subscriber.try_init().is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(true), "debug");
        assert_eq!(default_directive(false), "info");
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("transfer.log");
        let _guard = init(false, &path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_init_rejects_unwritable_path() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(init(false, dir.path()).is_err());
    }

    #[test]
    fn test_init_rejects_path_without_file_name() {
        assert!(init(false, Path::new("/")).is_err());
    }
}
