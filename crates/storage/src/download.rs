//! Download orchestration.
//!
//! Downloads every recorded member of one group into a local directory. The
//! group document and its location list are checked before anything is
//! dispatched: a missing document or an empty location list ends the run
//! without submitting a single transfer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dicom_transfer_common::{key_basename, ProgressCallback, DEFAULT_MAX_QUEUE_DEPTH};
use dicom_transfer_filesystem::ensure_directory;
use dicom_transfer_grouping::{GroupDocument, GroupId};
use dicom_transfer_pool::{
    join_all, PoolConfig, PoolTelemetry, TaskHandle, TracingTelemetry, WorkerPool,
};

use crate::error::{OrchestratorError, StorageError};
use crate::metrics::{TransferMetrics, OBJECT_DOWNLOAD, TOTAL_EXECUTION};
use crate::traits::{MetadataStore, ObjectStore};
use crate::types::{
    DownloadReport, FileOutcome, PhaseTracker, RunPhase, TransferLocation, TransferProgress,
    TransferStatistics,
};

/// Options for download runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Concurrent downloads.
    pub workers: usize,
    /// Queue bound of the download pool; `None` means unbounded.
    pub max_queue_depth: Option<usize>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        let workers: usize = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(workers)
    }
}

impl DownloadOptions {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            max_queue_depth: Some(DEFAULT_MAX_QUEUE_DEPTH),
        }
    }

    pub fn with_max_queue_depth(mut self, max_queue_depth: Option<usize>) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }
}

/// Downloads the members of a group.
pub struct DownloadOrchestrator {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    location: TransferLocation,
    options: DownloadOptions,
    metrics: Option<Arc<TransferMetrics>>,
    progress: Option<Arc<dyn ProgressCallback<TransferProgress>>>,
    telemetry: Arc<dyn PoolTelemetry>,
    phase: PhaseTracker,
}

impl DownloadOrchestrator {
    /// Create a new download orchestrator.
    ///
    /// # Arguments
    /// * `objects` - Object store holding group members
    /// * `metadata` - Metadata store holding group documents and locations
    /// * `location` - Bucket and table to read from
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        location: TransferLocation,
    ) -> Self {
        Self {
            objects,
            metadata,
            location,
            options: DownloadOptions::default(),
            metrics: None,
            progress: None,
            telemetry: Arc::new(TracingTelemetry),
            phase: PhaseTracker::new(),
        }
    }

    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<TransferMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback<TransferProgress>>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn PoolTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase.current()
    }

    pub fn metrics(&self) -> Option<&Arc<TransferMetrics>> {
        self.metrics.as_ref()
    }

    /// Download every recorded member of a group.
    ///
    /// Each object is written to `output_dir` under the last segment of its key.
    /// Members sharing a basename overwrite each other.
    ///
    /// # Arguments
    /// * `group_id` - Group to download
    /// * `output_dir` - Destination directory, created if absent
    ///
    /// # Returns
    /// The group document and one outcome per recorded location.
    ///
    /// # Errors
    /// Returns `GroupNotFound` if the group has no document, `NoFilesForGroup`
    /// if it has no recorded locations, and `FileSystem` if the output
    /// directory cannot be created. No transfer is attempted in these cases.
    /// The run phase ends at `Completed` whether or not the run succeeds.
    pub async fn download_group(
        &self,
        group_id: &GroupId,
        output_dir: &Path,
    ) -> Result<DownloadReport, OrchestratorError> {
        let started: Instant = Instant::now();
        self.phase.reset();
        tracing::info!(group_id = %group_id, output = %output_dir.display(), "download run started");

        let result: Result<DownloadReport, OrchestratorError> =
            self.run(group_id, output_dir, started).await;

        let (bytes, succeeded): (u64, bool) = match &result {
            Ok(report) => (report.statistics.bytes_transferred, report.is_success()),
            Err(e) => {
                tracing::error!(group_id = %group_id, error = %e, "download run aborted");
                (0, false)
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record(TOTAL_EXECUTION, started, bytes, succeeded);
        }
        self.phase.advance(RunPhase::Completed);
        result
    }

    async fn run(
        &self,
        group_id: &GroupId,
        output_dir: &Path,
        started: Instant,
    ) -> Result<DownloadReport, OrchestratorError> {
        let document: GroupDocument = self
            .metadata
            .get_group_document(&self.location.table, group_id)
            .await
            .map_err(|e| match e {
                StorageError::DocumentNotFound { .. } => OrchestratorError::GroupNotFound {
                    group_id: group_id.to_string(),
                },
                other => OrchestratorError::Storage(other),
            })?;

        let locations: Vec<String> = self
            .metadata
            .get_locations(&self.location.table, group_id)
            .await?;
        if locations.is_empty() {
            return Err(OrchestratorError::NoFilesForGroup {
                group_id: group_id.to_string(),
            });
        }
        tracing::info!(group_id = %group_id, files = locations.len(), "group locations fetched");

        ensure_directory(output_dir).map_err(|e| OrchestratorError::FileSystem {
            path: output_dir.to_path_buf(),
            message: e.to_string(),
        })?;

        self.phase.advance(RunPhase::Dispatching);
        let pool: WorkerPool = WorkerPool::with_telemetry(
            PoolConfig::new("downloads", self.options.workers)
                .with_max_queue_depth(self.options.max_queue_depth),
            Arc::clone(&self.telemetry),
        )?;

        let mut submitted: Vec<(PathBuf, String)> = Vec::with_capacity(locations.len());
        let mut handles: Vec<TaskHandle<FileOutcome>> = Vec::with_capacity(locations.len());
        let mut rejected: Vec<FileOutcome> = Vec::new();

        for key in locations {
            let destination: PathBuf = match key_basename(&key) {
                Ok(name) => output_dir.join(name),
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "location has no usable file name");
                    rejected.push(FileOutcome::failed(
                        output_dir,
                        key,
                        StorageError::InvalidConfig {
                            message: e.to_string(),
                        },
                    ));
                    continue;
                }
            };

            let task = download_object(
                Arc::clone(&self.objects),
                self.location.bucket.clone(),
                key.clone(),
                destination.clone(),
                self.metrics.clone(),
                self.progress.clone(),
            );
            match pool.submit(task).await {
                Ok(handle) => {
                    submitted.push((destination, key));
                    handles.push(handle);
                }
                Err(e) => rejected.push(FileOutcome::failed(
                    destination,
                    key,
                    StorageError::Other {
                        message: e.to_string(),
                    },
                )),
            }
        }

        self.phase.advance(RunPhase::Awaiting);
        pool.shutdown().await;

        let mut files: Vec<FileOutcome> = join_all(handles)
            .await
            .into_iter()
            .zip(submitted)
            .map(|(result, (path, key))| match result {
                Ok(outcome) => outcome,
                Err(e) => FileOutcome::failed(
                    path,
                    key,
                    StorageError::Other {
                        message: format!("transfer task did not complete: {e}"),
                    },
                ),
            })
            .collect();
        files.extend(rejected);

        let statistics: TransferStatistics = TransferStatistics::from_outcomes(&files);
        let report: DownloadReport = DownloadReport {
            group_id: group_id.clone(),
            output_dir: output_dir.to_path_buf(),
            document,
            files,
            statistics,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            group_id = %group_id,
            success = report.is_success(),
            files_transferred = report.statistics.files_transferred,
            files_failed = report.statistics.files_failed,
            bytes = report.statistics.bytes_transferred,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "download run finished"
        );
        Ok(report)
    }
}

async fn download_object(
    objects: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    destination: PathBuf,
    metrics: Option<Arc<TransferMetrics>>,
    progress: Option<Arc<dyn ProgressCallback<TransferProgress>>>,
) -> FileOutcome {
    let started: Instant = Instant::now();
    let downloaded: Result<u64, StorageError> = objects
        .get_object_to_file(&bucket, &key, &destination, progress.as_deref())
        .await;
    if let Some(metrics) = &metrics {
        metrics.record(
            OBJECT_DOWNLOAD,
            started,
            *downloaded.as_ref().unwrap_or(&0),
            downloaded.is_ok(),
        );
    }
    match downloaded {
        Ok(bytes) => {
            tracing::debug!(key = %key, path = %destination.display(), bytes = bytes, "downloaded");
            FileOutcome::succeeded(destination, key, bytes)
        }
        Err(e) => {
            tracing::error!(key = %key, error = %e, "download failed");
            FileOutcome::failed(destination, key, e)
        }
    }
}
