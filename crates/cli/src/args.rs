//! Command line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dicom_transfer_common::{
    DEFAULT_BUCKET, DEFAULT_LOG_FILE, DEFAULT_MAX_QUEUE_DEPTH, DEFAULT_REGION, DEFAULT_TABLE,
};
use dicom_transfer_storage::StorageSettings;

#[derive(Parser, Debug)]
#[command(name = "dicom-transfer")]
#[command(about = "Upload DICOM studies to S3 with DynamoDB metadata, or download them back")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Bucket holding study files
    #[arg(long, global = true, env = "DICOM_TRANSFER_BUCKET", default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Table holding study metadata and file locations
    #[arg(long, global = true, env = "DICOM_TRANSFER_TABLE", default_value = DEFAULT_TABLE)]
    pub table: String,

    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Custom AWS endpoint (local emulators)
    #[arg(long, global = true, env = "DICOM_TRANSFER_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log file, written in addition to the console
    #[arg(long, global = true, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload every file of a directory, grouped by study
    Upload(UploadArgs),
    /// Download every file of one study
    Download(DownloadArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Directory to upload
    pub directory: PathBuf,

    /// Concurrent studies (0 uses the number of CPUs)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Concurrent file uploads inside one study (at most --threads)
    #[arg(long)]
    pub files_per_study: Option<usize>,

    /// Maximum queued tasks per pool
    #[arg(long, default_value_t = DEFAULT_MAX_QUEUE_DEPTH)]
    pub queue_depth: usize,

    /// Remove local files once uploaded and recorded
    #[arg(long)]
    pub delete_after_upload: bool,

    /// Also upload each study document as metadata.json
    #[arg(long)]
    pub upload_descriptor: bool,

    /// Only upload files matching these globs
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Skip files matching these globs
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Do not descend into subdirectories
    #[arg(long)]
    pub no_recursive: bool,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Study Instance UID to download
    pub study_uid: String,

    /// Output directory, created if absent
    #[arg(long)]
    pub output: PathBuf,

    /// Concurrent downloads (0 uses the number of CPUs)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Maximum queued tasks
    #[arg(long, default_value_t = DEFAULT_MAX_QUEUE_DEPTH)]
    pub queue_depth: usize,
}

impl Cli {
    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings::default()
            .with_region(&self.region)
            .with_bucket(&self.bucket)
            .with_table(&self.table)
            .with_endpoint_url(self.endpoint_url.clone())
    }
}

/// Worker count for `--threads`: unset or 0 means the available parallelism.
pub fn resolve_threads(threads: Option<usize>) -> usize {
    match threads {
        Some(n) if n > 0 => n,
        _ => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

/// A queue depth of 0 disables the bound.
pub fn resolve_queue_depth(depth: usize) -> Option<usize> {
    (depth > 0).then_some(depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("dicom-transfer").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_upload() {
        let cli = parse(&[
            "upload",
            "/data/scans",
            "--threads",
            "8",
            "--include",
            "**/*.dcm",
            "--exclude",
            "**/tmp/**",
            "--delete-after-upload",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Upload(args) => {
                assert_eq!(args.directory, PathBuf::from("/data/scans"));
                assert_eq!(args.threads, Some(8));
                assert_eq!(args.include, vec!["**/*.dcm"]);
                assert_eq!(args.exclude, vec!["**/tmp/**"]);
                assert!(args.delete_after_upload);
                assert!(!args.upload_descriptor);
                assert_eq!(args.queue_depth, 1000);
            }
            Command::Download(_) => panic!("expected upload"),
        }
    }

    #[test]
    fn test_parse_download_requires_output() {
        assert!(parse(&["download", "1.2.3"]).is_err());

        let cli = parse(&["download", "1.2.3", "--output", "out", "--bucket", "b"]).unwrap();
        assert_eq!(cli.bucket, "b");
        match cli.command {
            Command::Download(args) => {
                assert_eq!(args.study_uid, "1.2.3");
                assert_eq!(args.output, PathBuf::from("out"));
            }
            Command::Upload(_) => panic!("expected download"),
        }
    }

    #[test]
    fn test_unknown_option_rejected() {
        assert!(parse(&["upload", "dir", "--bogus"]).is_err());
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_resolve_threads() {
        assert_eq!(resolve_threads(Some(3)), 3);
        assert!(resolve_threads(Some(0)) >= 1);
        assert!(resolve_threads(None) >= 1);
    }

    #[test]
    fn test_resolve_queue_depth() {
        assert_eq!(resolve_queue_depth(10), Some(10));
        assert_eq!(resolve_queue_depth(0), None);
    }
}
