//! Shared data structures for transfers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use dicom_transfer_common::{DEFAULT_BUCKET, DEFAULT_REGION, DEFAULT_TABLE};
use dicom_transfer_grouping::{GroupDocument, GroupId};
use serde::{Deserialize, Serialize};

use crate::error::{GroupFailure, StorageError, TransferError};

/// Connection settings for the remote stores.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// AWS region.
    pub region: String,
    /// Bucket holding transferred objects.
    pub bucket: String,
    /// Table holding group documents and locations.
    pub table: String,
    /// Custom endpoint (local emulators, gateways).
    pub endpoint_url: Option<String>,
    /// Static credentials; `None` uses the default provider chain.
    pub credentials: Option<AwsCredentials>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.into(),
            bucket: DEFAULT_BUCKET.into(),
            table: DEFAULT_TABLE.into(),
            endpoint_url: None,
            credentials: None,
        }
    }
}

impl StorageSettings {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_endpoint_url(mut self, endpoint_url: Option<String>) -> Self {
        self.endpoint_url = endpoint_url;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<AwsCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Bucket and table used by the orchestrators.
    pub fn location(&self) -> TransferLocation {
        TransferLocation::new(&self.bucket, &self.table)
    }
}

/// AWS credentials.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// Where a run reads and writes: one bucket and one metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLocation {
    pub bucket: String,
    pub table: String,
}

impl TransferLocation {
    pub fn new(bucket: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            table: table.into(),
        }
    }
}

/// Progress of a single object transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    pub operation: OperationType,
    pub key: String,
    /// Bytes moved so far; never decreases within one transfer.
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
}

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Uploading,
    Downloading,
}

/// Outcome of one file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// Local path (source on upload, destination on download).
    pub path: PathBuf,
    /// Object key.
    pub key: String,
    /// Bytes transferred, when the transfer succeeded.
    pub bytes: Option<u64>,
    /// Why the transfer failed.
    pub error: Option<StorageError>,
    /// Local cleanup problem after a successful upload. Never a failure.
    pub cleanup_error: Option<String>,
}

impl FileOutcome {
    pub fn succeeded(path: impl Into<PathBuf>, key: impl Into<String>, bytes: u64) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
            bytes: Some(bytes),
            error: None,
            cleanup_error: None,
        }
    }

    pub fn failed(path: impl Into<PathBuf>, key: impl Into<String>, error: StorageError) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
            bytes: None,
            error: Some(error),
            cleanup_error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one group's upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub group_id: GroupId,
    /// Member transfers, in member order. Empty if the group failed early.
    pub files: Vec<FileOutcome>,
    /// Failure that stopped the group before its file transfers.
    pub failure: Option<GroupFailure>,
}

impl GroupOutcome {
    pub fn completed(group_id: GroupId, files: Vec<FileOutcome>) -> Self {
        Self {
            group_id,
            files,
            failure: None,
        }
    }

    pub fn failed(group_id: GroupId, failure: GroupFailure) -> Self {
        Self {
            group_id,
            files: Vec::new(),
            failure: Some(failure),
        }
    }

    /// No early failure and every file succeeded.
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.files.iter().all(FileOutcome::is_success)
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.is_success())
    }
}

/// Aggregated statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStatistics {
    /// Files attempted.
    pub files_processed: u64,
    /// Files transferred successfully.
    pub files_transferred: u64,
    /// Files that failed.
    pub files_failed: u64,
    /// Total bytes transferred.
    pub bytes_transferred: u64,
    /// Per-file errors.
    pub errors: Vec<TransferError>,
}

impl TransferStatistics {
    /// Statistics for a set of file outcomes.
    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a FileOutcome>,
    {
        let mut stats: TransferStatistics = TransferStatistics::default();
        for outcome in outcomes {
            stats.record(outcome);
        }
        stats
    }

    pub fn record(&mut self, outcome: &FileOutcome) {
        self.files_processed += 1;
        match &outcome.error {
            None => {
                self.files_transferred += 1;
                self.bytes_transferred += outcome.bytes.unwrap_or(0);
            }
            Some(error) => {
                self.files_failed += 1;
                self.errors
                    .push(TransferError::new(outcome.key.clone(), error.clone()));
            }
        }
    }
}

/// Result of an upload run.
#[derive(Debug, Clone)]
pub struct UploadReport {
    /// Identifier of this run; names the unclassified prefix.
    pub run_id: String,
    /// One outcome per group, ordered by group id.
    pub groups: Vec<GroupOutcome>,
    /// Outcomes of unclassified files, in input order.
    pub unclassified: Vec<FileOutcome>,
    pub statistics: TransferStatistics,
    pub elapsed: Duration,
}

impl UploadReport {
    /// Every group and every unclassified file succeeded.
    pub fn is_success(&self) -> bool {
        self.groups.iter().all(GroupOutcome::is_success)
            && self.unclassified.iter().all(FileOutcome::is_success)
    }

    pub fn failed_groups(&self) -> Vec<&GroupOutcome> {
        self.groups.iter().filter(|g| !g.is_success()).collect()
    }

    /// Failed files across groups and the unclassified set.
    pub fn failed_files(&self) -> Vec<&FileOutcome> {
        self.groups
            .iter()
            .flat_map(|g| g.failed_files())
            .chain(self.unclassified.iter().filter(|f| !f.is_success()))
            .collect()
    }
}

/// Result of a download run.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub group_id: GroupId,
    pub output_dir: PathBuf,
    /// The group's stored document.
    pub document: GroupDocument,
    /// One outcome per recorded location.
    pub files: Vec<FileOutcome>,
    pub statistics: TransferStatistics,
    pub elapsed: Duration,
}

impl DownloadReport {
    pub fn is_success(&self) -> bool {
        self.files.iter().all(FileOutcome::is_success)
    }

    pub fn failed_files(&self) -> Vec<&FileOutcome> {
        self.files.iter().filter(|f| !f.is_success()).collect()
    }
}

/// Lifecycle of a run. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RunPhase {
    Initializing = 0,
    Grouping = 1,
    Dispatching = 2,
    Awaiting = 3,
    Completed = 4,
}

impl RunPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunPhase::Initializing,
            1 => RunPhase::Grouping,
            2 => RunPhase::Dispatching,
            3 => RunPhase::Awaiting,
            _ => RunPhase::Completed,
        }
    }
}

/// Shared, forward-only phase marker of the current run.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    phase: AtomicU8,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Start a new run.
    pub(crate) fn reset(&self) {
        self.phase.store(RunPhase::Initializing as u8, Ordering::Release);
    }

    /// Move to `phase` if it is ahead of the current phase.
    pub(crate) fn advance(&self, phase: RunPhase) {
        let previous: u8 = self.phase.fetch_max(phase as u8, Ordering::AcqRel);
        if previous < phase as u8 {
            tracing::debug!(phase = ?phase, "run phase changed");
        }
    }
}
