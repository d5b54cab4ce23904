//! Upload orchestration.
//!
//! A run classifies its input files into groups, then fans out over two
//! levels of worker pools:
//!
//! - A top-level pool runs one task per group and one task per unclassified file
//! - Each group task creates its own smaller pool for the group's member files
//!
//! Group tasks write the group document before any member upload starts. A
//! group whose document cannot be produced or stored is reported failed and
//! transfers nothing; sibling groups are unaffected. Member uploads record
//! their object key in the metadata store once the object is stored.
//!
//! Failures never cancel siblings: the run waits for every task and reports
//! per-group and per-file outcomes.
//!
//! # Example
//!
//! ```ignore
//! use dicom_transfer_storage::{UploadOptions, UploadOrchestrator};
//!
//! let orchestrator = UploadOrchestrator::new(objects, metadata, classifier, describer, location)
//!     .with_options(UploadOptions::new(8));
//! let report = orchestrator.upload_files(files).await?;
//! if !report.is_success() {
//!     for group in report.failed_groups() {
//!         eprintln!("{} failed", group.group_id);
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dicom_transfer_common::{
    join_key, study_object_key, unclassified_object_key, ProgressCallback,
    DEFAULT_FILES_PER_GROUP, DEFAULT_MAX_QUEUE_DEPTH, DESCRIPTOR_FILE_NAME, STUDY_KEY_PREFIX,
};
use dicom_transfer_filesystem::{scan_files, ScanOptions};
use dicom_transfer_grouping::{
    group_files, FileClassifier, FileGrouping, GroupDescriber, GroupDocument, GroupId,
};
use dicom_transfer_pool::{
    join_all, Aggregate, PoolConfig, PoolError, PoolTelemetry, TaskError, TaskHandle,
    TracingTelemetry, WorkerPool,
};

use crate::error::{GroupFailure, OrchestratorError, StorageError};
use crate::metrics::{TransferMetrics, METADATA_WRITE, OBJECT_UPLOAD, TOTAL_EXECUTION};
use crate::traits::{MetadataStore, ObjectStore};
use crate::types::{
    FileOutcome, GroupOutcome, PhaseTracker, RunPhase, TransferLocation, TransferProgress,
    TransferStatistics, UploadReport,
};

/// Options for upload runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Workers of the top-level pool (concurrent groups and unclassified files).
    pub group_workers: usize,
    /// Workers of each per-group pool. Never exceeds `group_workers`.
    pub files_per_group: usize,
    /// Queue bound applied to every pool of the run; `None` means unbounded.
    pub max_queue_depth: Option<usize>,
    /// Remove local files once they are uploaded and recorded.
    pub delete_after_upload: bool,
    /// Also upload each group document as `studies/<group>/metadata.json`.
    pub upload_descriptor: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        let workers: usize = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(workers)
    }
}

impl UploadOptions {
    /// Options for `group_workers` top-level workers.
    ///
    /// `files_per_group` defaults to `min(group_workers, 4)`.
    pub fn new(group_workers: usize) -> Self {
        Self {
            group_workers,
            files_per_group: group_workers.min(DEFAULT_FILES_PER_GROUP),
            max_queue_depth: Some(DEFAULT_MAX_QUEUE_DEPTH),
            delete_after_upload: false,
            upload_descriptor: false,
        }
    }

    /// Set the per-group pool size, clamped to `group_workers`.
    pub fn with_files_per_group(mut self, files_per_group: usize) -> Self {
        self.files_per_group = files_per_group.min(self.group_workers);
        self
    }

    pub fn with_max_queue_depth(mut self, max_queue_depth: Option<usize>) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    pub fn with_delete_after_upload(mut self, delete_after_upload: bool) -> Self {
        self.delete_after_upload = delete_after_upload;
        self
    }

    pub fn with_upload_descriptor(mut self, upload_descriptor: bool) -> Self {
        self.upload_descriptor = upload_descriptor;
        self
    }

    /// Check that both pool levels of a run can be created.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if either pool would have no workers or a zero
    /// queue bound.
    pub fn validate(&self) -> Result<(), PoolError> {
        self.group_pool_config().validate()?;
        self.member_pool_config("group".to_string()).validate()
    }

    fn group_pool_config(&self) -> PoolConfig {
        PoolConfig::new("groups", self.group_workers).with_max_queue_depth(self.max_queue_depth)
    }

    fn member_pool_config(&self, name: String) -> PoolConfig {
        PoolConfig::new(name, self.files_per_group).with_max_queue_depth(self.max_queue_depth)
    }
}

/// Everything a task of one run needs, shared by `Arc`.
struct RunContext {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    describer: Arc<dyn GroupDescriber>,
    location: TransferLocation,
    options: UploadOptions,
    metrics: Option<Arc<TransferMetrics>>,
    progress: Option<Arc<dyn ProgressCallback<TransferProgress>>>,
    telemetry: Arc<dyn PoolTelemetry>,
}

impl RunContext {
    fn record(&self, operation: &str, started: Instant, bytes: u64, succeeded: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record(operation, started, bytes, succeeded);
        }
    }
}

/// Uploads classified file groups and their documents.
pub struct UploadOrchestrator {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    classifier: Arc<dyn FileClassifier>,
    describer: Arc<dyn GroupDescriber>,
    location: TransferLocation,
    options: UploadOptions,
    metrics: Option<Arc<TransferMetrics>>,
    progress: Option<Arc<dyn ProgressCallback<TransferProgress>>>,
    telemetry: Arc<dyn PoolTelemetry>,
    phase: Arc<PhaseTracker>,
}

impl UploadOrchestrator {
    /// Create a new upload orchestrator.
    ///
    /// # Arguments
    /// * `objects` - Object store receiving file contents
    /// * `metadata` - Metadata store receiving group documents and locations
    /// * `classifier` - Assigns files to groups
    /// * `describer` - Builds a group's document from its members
    /// * `location` - Bucket and table of the run
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        classifier: Arc<dyn FileClassifier>,
        describer: Arc<dyn GroupDescriber>,
        location: TransferLocation,
    ) -> Self {
        Self {
            objects,
            metadata,
            classifier,
            describer,
            location,
            options: UploadOptions::default(),
            metrics: None,
            progress: None,
            telemetry: Arc::new(TracingTelemetry),
            phase: Arc::new(PhaseTracker::new()),
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Record timings into a caller-owned metrics handle.
    pub fn with_metrics(mut self, metrics: Arc<TransferMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Receive byte progress of every object transfer.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback<TransferProgress>>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Observe task events of every pool the run creates.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn PoolTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Phase of the current (or last) run.
    pub fn phase(&self) -> RunPhase {
        self.phase.current()
    }

    pub fn metrics(&self) -> Option<&Arc<TransferMetrics>> {
        self.metrics.as_ref()
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Scan a directory and upload every file found.
    ///
    /// # Errors
    /// Returns `FileSystem` if the directory cannot be scanned, otherwise the
    /// same errors as [`upload_files`](Self::upload_files).
    pub async fn upload_directory(
        &self,
        scan: ScanOptions,
    ) -> Result<UploadReport, OrchestratorError> {
        let root: PathBuf = scan.root.clone();
        let files: Vec<PathBuf> = tokio::task::spawn_blocking(move || scan_files(&scan, None))
            .await
            .map_err(|e| OrchestratorError::Preparation {
                message: format!("directory scan did not complete: {e}"),
            })?
            .map_err(|e| OrchestratorError::FileSystem {
                path: root.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(root = %root.display(), files = files.len(), "scanned upload directory");
        self.upload_files(files).await
    }

    /// Classify and upload a list of files.
    ///
    /// # Arguments
    /// * `files` - Local files to upload
    ///
    /// # Returns
    /// Per-group and per-file outcomes. Individual failures are reported in
    /// the outcome, not as an error.
    ///
    /// # Errors
    /// Returns an error only when nothing could be dispatched: the pool
    /// options are invalid, the metadata table is unusable, classification
    /// did not complete, or the top-level pool could not be created. Options
    /// are checked before the table is touched. The run phase ends at
    /// `Completed` whether or not the run succeeds.
    pub async fn upload_files(&self, files: Vec<PathBuf>) -> Result<UploadReport, OrchestratorError> {
        let started: Instant = Instant::now();
        self.phase.reset();
        let run_id: String = uuid::Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, files = files.len(), "upload run started");

        let result: Result<UploadReport, OrchestratorError> =
            self.run(run_id.clone(), files, started).await;

        let (bytes, succeeded): (u64, bool) = match &result {
            Ok(report) => (report.statistics.bytes_transferred, report.is_success()),
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "upload run aborted");
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
        run_id: String,
        files: Vec<PathBuf>,
        started: Instant,
    ) -> Result<UploadReport, OrchestratorError> {
        self.options.validate()?;
        self.metadata.ensure_table(&self.location.table).await?;

        self.phase.advance(RunPhase::Grouping);
        let grouping: FileGrouping = self.classify(files).await?;
        tracing::info!(
            groups = grouping.group_count(),
            unclassified = grouping.unclassified.len(),
            "files grouped"
        );

        self.phase.advance(RunPhase::Dispatching);
        let context: Arc<RunContext> = Arc::new(RunContext {
            objects: Arc::clone(&self.objects),
            metadata: Arc::clone(&self.metadata),
            describer: Arc::clone(&self.describer),
            location: self.location.clone(),
            options: self.options.clone(),
            metrics: self.metrics.clone(),
            progress: self.progress.clone(),
            telemetry: Arc::clone(&self.telemetry),
        });

        let pool: WorkerPool = WorkerPool::with_telemetry(
            self.options.group_pool_config(),
            Arc::clone(&self.telemetry),
        )?;

        let mut group_tasks: Vec<(GroupId, Result<TaskHandle<GroupOutcome>, GroupFailure>)> =
            Vec::with_capacity(grouping.group_count());
        for (group_id, members) in grouping.groups {
            let task = run_group(Arc::clone(&context), group_id.clone(), members);
            let submitted = pool.submit(task).await.map_err(GroupFailure::from);
            group_tasks.push((group_id, submitted));
        }

        let mut file_tasks: Vec<(PathBuf, Result<TaskHandle<FileOutcome>, StorageError>)> =
            Vec::with_capacity(grouping.unclassified.len());
        for path in grouping.unclassified {
            let submitted = match unclassified_object_key(&run_id, &path) {
                Ok(key) => pool
                    .submit(upload_member(Arc::clone(&context), None, path.clone(), key))
                    .await
                    .map_err(|e| StorageError::Other {
                        message: e.to_string(),
                    }),
                Err(e) => Err(StorageError::InvalidConfig {
                    message: e.to_string(),
                }),
            };
            file_tasks.push((path, submitted));
        }

        self.phase.advance(RunPhase::Awaiting);
        pool.shutdown().await;

        let mut groups: Vec<GroupOutcome> = Vec::with_capacity(group_tasks.len());
        for (group_id, submitted) in group_tasks {
            let outcome: GroupOutcome = match submitted {
                Ok(handle) => match handle.wait().await {
                    Ok(outcome) => outcome,
                    Err(e) => GroupOutcome::failed(group_id, GroupFailure::Task(e)),
                },
                Err(failure) => GroupOutcome::failed(group_id, failure),
            };
            groups.push(outcome);
        }

        let mut unclassified: Vec<FileOutcome> = Vec::with_capacity(file_tasks.len());
        for (path, submitted) in file_tasks {
            let key: String = path.display().to_string();
            let outcome: FileOutcome = match submitted {
                Ok(handle) => match handle.wait().await {
                    Ok(outcome) => outcome,
                    Err(e) => FileOutcome::failed(path, key, task_error(e)),
                },
                Err(error) => FileOutcome::failed(path, key, error),
            };
            unclassified.push(outcome);
        }

        let statistics: TransferStatistics = TransferStatistics::from_outcomes(
            groups
                .iter()
                .flat_map(|g| g.files.iter())
                .chain(unclassified.iter()),
        );
        let report: UploadReport = UploadReport {
            run_id,
            groups,
            unclassified,
            statistics,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            run_id = %report.run_id,
            success = report.is_success(),
            files_transferred = report.statistics.files_transferred,
            files_failed = report.statistics.files_failed,
            bytes = report.statistics.bytes_transferred,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "upload run finished"
        );
        Ok(report)
    }

    async fn classify(&self, files: Vec<PathBuf>) -> Result<FileGrouping, OrchestratorError> {
        let classifier: Arc<dyn FileClassifier> = Arc::clone(&self.classifier);
        tokio::task::spawn_blocking(move || group_files(&files, classifier.as_ref()))
            .await
            .map_err(|e| OrchestratorError::Preparation {
                message: format!("classification did not complete: {e}"),
            })
    }
}

/// Describe, record and upload one group.
async fn run_group(context: Arc<RunContext>, group_id: GroupId, members: Vec<PathBuf>) -> GroupOutcome {
    let document: GroupDocument = match describe(&context, &group_id, &members).await {
        Ok(document) => document,
        Err(failure) => {
            tracing::error!(group_id = %group_id, error = %failure, "group skipped");
            return GroupOutcome::failed(group_id, failure);
        }
    };

    let started: Instant = Instant::now();
    let written = context
        .metadata
        .put_group_document(&context.location.table, &group_id, &document)
        .await;
    context.record(METADATA_WRITE, started, 0, written.is_ok());
    if let Err(e) = written {
        tracing::error!(group_id = %group_id, error = %e, "group document not stored, group skipped");
        return GroupOutcome::failed(group_id, GroupFailure::Metadata(e));
    }

    let pool: WorkerPool = match WorkerPool::with_telemetry(
        context.options.member_pool_config(format!("group-{group_id}")),
        Arc::clone(&context.telemetry),
    ) {
        Ok(pool) => pool,
        Err(e) => return GroupOutcome::failed(group_id, GroupFailure::Pool(e)),
    };

    let mut paths: Vec<(PathBuf, String)> = Vec::with_capacity(members.len() + 1);
    let mut handles: Vec<TaskHandle<FileOutcome>> = Vec::with_capacity(members.len() + 1);
    let mut rejected: Vec<FileOutcome> = Vec::new();

    for path in members {
        let key: String = match study_object_key(group_id.as_str(), &path) {
            Ok(key) => key,
            Err(e) => {
                let key: String = path.display().to_string();
                rejected.push(FileOutcome::failed(
                    path,
                    key,
                    StorageError::InvalidConfig {
                        message: e.to_string(),
                    },
                ));
                continue;
            }
        };
        let task = upload_member(
            Arc::clone(&context),
            Some(group_id.clone()),
            path.clone(),
            key.clone(),
        );
        match pool.submit(task).await {
            Ok(handle) => {
                paths.push((path, key));
                handles.push(handle);
            }
            Err(e) => rejected.push(FileOutcome::failed(
                path,
                key,
                StorageError::Other {
                    message: e.to_string(),
                },
            )),
        }
    }

    if context.options.upload_descriptor {
        let key: String = join_key(&[STUDY_KEY_PREFIX, group_id.as_str(), DESCRIPTOR_FILE_NAME]);
        let task = upload_descriptor(
            Arc::clone(&context),
            group_id.clone(),
            document,
            key.clone(),
        );
        match pool.submit(task).await {
            Ok(handle) => {
                paths.push((PathBuf::from(DESCRIPTOR_FILE_NAME), key));
                handles.push(handle);
            }
            Err(e) => rejected.push(FileOutcome::failed(
                DESCRIPTOR_FILE_NAME,
                key,
                StorageError::Other {
                    message: e.to_string(),
                },
            )),
        }
    }

    pool.shutdown().await;

    let mut files: Vec<FileOutcome> = join_all(handles)
        .await
        .into_iter()
        .zip(paths)
        .map(|(result, (path, key))| match result {
            Ok(outcome) => outcome,
            Err(e) => FileOutcome::failed(path, key, task_error(e)),
        })
        .collect();
    files.extend(rejected);

    let summary: Aggregate<&str> = files
        .iter()
        .map(|f: &FileOutcome| (f.key.as_str(), f.is_success()))
        .collect();
    if summary.is_success() {
        tracing::info!(group_id = %group_id, files = summary.total(), "group uploaded");
    } else {
        tracing::warn!(
            group_id = %group_id,
            succeeded = summary.succeeded(),
            failed = summary.failed().len(),
            "group uploaded with failures"
        );
    }

    GroupOutcome::completed(group_id, files)
}

async fn describe(
    context: &RunContext,
    group_id: &GroupId,
    members: &[PathBuf],
) -> Result<GroupDocument, GroupFailure> {
    let describer: Arc<dyn GroupDescriber> = Arc::clone(&context.describer);
    let group: GroupId = group_id.clone();
    let files: Vec<PathBuf> = members.to_vec();
    tokio::task::spawn_blocking(move || describer.describe(&group, &files))
        .await
        .map_err(|e| {
            GroupFailure::Task(TaskError::Panicked {
                message: e.to_string(),
            })
        })?
        .map_err(GroupFailure::from)
}

/// Upload one file, record its location when it belongs to a group, then
/// optionally remove the local copy.
async fn upload_member(
    context: Arc<RunContext>,
    group_id: Option<GroupId>,
    path: PathBuf,
    key: String,
) -> FileOutcome {
    let started: Instant = Instant::now();
    let uploaded: Result<u64, StorageError> = context
        .objects
        .put_object_from_file(
            &context.location.bucket,
            &key,
            &path,
            context.progress.as_deref(),
        )
        .await;
    let bytes: u64 = match uploaded {
        Ok(bytes) => {
            context.record(OBJECT_UPLOAD, started, bytes, true);
            bytes
        }
        Err(e) => {
            context.record(OBJECT_UPLOAD, started, 0, false);
            tracing::error!(key = %key, path = %path.display(), error = %e, "upload failed");
            return FileOutcome::failed(path, key, e);
        }
    };

    if let Some(group_id) = &group_id {
        if let Err(e) = record_location(&context, group_id, &key).await {
            return FileOutcome::failed(path, key, e);
        }
    }

    tracing::debug!(key = %key, bytes = bytes, "uploaded");
    let mut outcome: FileOutcome = FileOutcome::succeeded(path, key, bytes);
    if context.options.delete_after_upload {
        outcome.cleanup_error = remove_local(&outcome.path).await;
    }
    outcome
}

/// Upload a group document as a JSON object next to the group's members.
async fn upload_descriptor(
    context: Arc<RunContext>,
    group_id: GroupId,
    document: GroupDocument,
    key: String,
) -> FileOutcome {
    let body: Vec<u8> = match serde_json::to_vec_pretty(&document) {
        Ok(body) => body,
        Err(e) => {
            return FileOutcome::failed(
                DESCRIPTOR_FILE_NAME,
                key,
                StorageError::Other {
                    message: format!("failed to serialize group document: {e}"),
                },
            )
        }
    };

    let started: Instant = Instant::now();
    let uploaded: Result<u64, StorageError> = context
        .objects
        .put_object(
            &context.location.bucket,
            &key,
            &body,
            Some("application/json"),
        )
        .await;
    context.record(OBJECT_UPLOAD, started, *uploaded.as_ref().unwrap_or(&0), uploaded.is_ok());
    let bytes: u64 = match uploaded {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "descriptor upload failed");
            return FileOutcome::failed(DESCRIPTOR_FILE_NAME, key, e);
        }
    };

    if let Err(e) = record_location(&context, &group_id, &key).await {
        return FileOutcome::failed(DESCRIPTOR_FILE_NAME, key, e);
    }
    FileOutcome::succeeded(DESCRIPTOR_FILE_NAME, key, bytes)
}

async fn record_location(
    context: &RunContext,
    group_id: &GroupId,
    key: &str,
) -> Result<(), StorageError> {
    let started: Instant = Instant::now();
    let appended: Result<(), StorageError> = context
        .metadata
        .append_location(&context.location.table, group_id, key)
        .await;
    context.record(METADATA_WRITE, started, 0, appended.is_ok());
    if let Err(e) = &appended {
        tracing::error!(group_id = %group_id, key = %key, error = %e, "location not recorded");
    }
    appended
}

/// Remove an uploaded local file. Failures are logged and returned, never fatal.
async fn remove_local(path: &Path) -> Option<String> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove local file after upload");
            Some(e.to_string())
        }
    }
}

fn task_error(error: TaskError) -> StorageError {
    StorageError::Other {
        message: format!("transfer task did not complete: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::memory::{InMemoryMetadataStore, InMemoryObjectStore};
    use dicom_transfer_grouping::{ClassificationError, DescribeError};
    use serde_json::Value;
    use tempfile::TempDir;

    const TEST_TIMEOUT: Duration = Duration::from_secs(10);

    struct CountingDescriber;

    impl GroupDescriber for CountingDescriber {
        fn describe(
            &self,
            group_id: &GroupId,
            files: &[PathBuf],
        ) -> Result<GroupDocument, DescribeError> {
            if files.is_empty() {
                return Err(DescribeError::EmptyGroup {
                    group_id: group_id.to_string(),
                });
            }
            let mut document = GroupDocument::new();
            document.insert("TotalFiles".into(), Value::from(files.len()));
            Ok(document)
        }
    }

    /// Files named `<group>_<n>.dcm` belong to `<group>`; anything else is unclassified.
    fn classifier() -> Arc<dyn FileClassifier> {
        Arc::new(|path: &Path| -> Result<GroupId, ClassificationError> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            match name.split_once('_') {
                Some((group, _)) => GroupId::new(group).map_err(|_| {
                    ClassificationError::MissingGroupId {
                        path: path.to_path_buf(),
                    }
                }),
                None => Err(ClassificationError::MissingGroupId {
                    path: path.to_path_buf(),
                }),
            }
        })
    }

    fn write(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, name.as_bytes()).unwrap();
        path
    }

    fn orchestrator(
        objects: &Arc<InMemoryObjectStore>,
        metadata: &Arc<InMemoryMetadataStore>,
        options: UploadOptions,
    ) -> UploadOrchestrator {
        UploadOrchestrator::new(
            Arc::clone(objects) as Arc<dyn ObjectStore>,
            Arc::clone(metadata) as Arc<dyn MetadataStore>,
            classifier(),
            Arc::new(CountingDescriber),
            TransferLocation::new("bucket", "table"),
        )
        .with_options(options)
    }

    #[test]
    fn test_upload_options_defaults() {
        let options = UploadOptions::new(8);
        assert_eq!(options.files_per_group, 4);
        assert_eq!(options.max_queue_depth, Some(1000));
        assert!(!options.delete_after_upload);
        assert!(!options.upload_descriptor);

        assert_eq!(UploadOptions::new(2).files_per_group, 2);
        assert_eq!(UploadOptions::new(3).with_files_per_group(16).files_per_group, 3);
    }

    #[test]
    fn test_upload_options_validate() {
        assert!(UploadOptions::new(2).validate().is_ok());
        assert!(UploadOptions::new(2).with_max_queue_depth(None).validate().is_ok());

        for options in [
            UploadOptions::new(0),
            UploadOptions::new(2).with_files_per_group(0),
            UploadOptions::new(2).with_max_queue_depth(Some(0)),
        ] {
            assert!(matches!(options.validate(), Err(PoolError::InvalidConfig { .. })));
        }
    }

    #[tokio::test]
    async fn test_invalid_options_touch_nothing() {
        let dir = TempDir::new().unwrap();
        let files = vec![write(&dir, "g1_a.dcm")];

        for options in [UploadOptions::new(2).with_files_per_group(0), UploadOptions::new(0)] {
            let objects = Arc::new(InMemoryObjectStore::new());
            let metadata = Arc::new(InMemoryMetadataStore::new());
            let orchestrator = orchestrator(&objects, &metadata, options);

            let err = orchestrator.upload_files(files.clone()).await.unwrap_err();
            assert!(matches!(err, OrchestratorError::Pool(PoolError::InvalidConfig { .. })));
            assert_eq!(metadata.ensure_calls(), 0);
            assert_eq!(metadata.document_writes(), 0);
            assert_eq!(objects.put_calls(), 0);
            assert_eq!(orchestrator.phase(), RunPhase::Completed);
        }
    }

    #[tokio::test]
    async fn test_empty_input_succeeds() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let orchestrator = orchestrator(&objects, &metadata, UploadOptions::new(2));

        let report = orchestrator.upload_files(Vec::new()).await.unwrap();
        assert!(report.is_success());
        assert!(report.groups.is_empty());
        assert_eq!(metadata.ensure_calls(), 1);
        assert_eq!(objects.put_calls(), 0);
        assert_eq!(orchestrator.phase(), RunPhase::Completed);
    }

    #[tokio::test]
    async fn test_descriptor_artifact_uploaded() {
        let dir = TempDir::new().unwrap();
        let files = vec![write(&dir, "g1_a.dcm"), write(&dir, "g1_b.dcm")];
        let objects = Arc::new(InMemoryObjectStore::new());
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let orchestrator = orchestrator(
            &objects,
            &metadata,
            UploadOptions::new(2).with_upload_descriptor(true),
        );

        let report = tokio::time::timeout(TEST_TIMEOUT, orchestrator.upload_files(files))
            .await
            .unwrap()
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.groups[0].files.len(), 3);

        let body = objects.object("bucket", "studies/g1/metadata.json").unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["TotalFiles"], Value::from(2));

        let group = GroupId::new("g1").unwrap();
        let locations = metadata.get_locations("table", &group).await.unwrap();
        assert!(locations.contains(&"studies/g1/metadata.json".to_string()));
        assert_eq!(locations.len(), 3);
    }

    #[tokio::test]
    async fn test_append_failure_fails_file() {
        let dir = TempDir::new().unwrap();
        let files = vec![write(&dir, "g1_a.dcm"), write(&dir, "g1_b.dcm")];
        let objects = Arc::new(InMemoryObjectStore::new());
        let metadata = Arc::new(InMemoryMetadataStore::new());
        metadata.fail_appends_matching("g1_b");
        let orchestrator = orchestrator(&objects, &metadata, UploadOptions::new(2));

        let report = orchestrator.upload_files(files).await.unwrap();
        assert!(!report.is_success());
        let failed = report.failed_files();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].key, "studies/g1/g1_b.dcm");
        // The object was stored even though its location was not recorded.
        assert!(objects.object("bucket", "studies/g1/g1_b.dcm").is_some());
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let dir = TempDir::new().unwrap();
        let files = vec![write(&dir, "g1_a.dcm"), write(&dir, "loose.txt")];
        let objects = Arc::new(InMemoryObjectStore::new());
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let metrics = Arc::new(TransferMetrics::new().unwrap());
        let orchestrator = orchestrator(&objects, &metadata, UploadOptions::new(2))
            .with_metrics(Arc::clone(&metrics));

        orchestrator.upload_files(files).await.unwrap();

        assert_eq!(metrics.get(OBJECT_UPLOAD).unwrap().count, 2);
        // One document write and one location append.
        assert_eq!(metrics.get(METADATA_WRITE).unwrap().count, 2);
        assert_eq!(metrics.get(TOTAL_EXECUTION).unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_table_failure_is_run_error() {
        struct BrokenTable;

        #[async_trait::async_trait]
        impl MetadataStore for BrokenTable {
            async fn ensure_table(&self, _table: &str) -> Result<(), StorageError> {
                Err(StorageError::AccessDenied {
                    resource: "table".into(),
                    message: "denied".into(),
                })
            }
            async fn put_group_document(
                &self,
                _table: &str,
                _group_id: &GroupId,
                _document: &GroupDocument,
            ) -> Result<(), StorageError> {
                unreachable!()
            }
            async fn get_group_document(
                &self,
                _table: &str,
                _group_id: &GroupId,
            ) -> Result<GroupDocument, StorageError> {
                unreachable!()
            }
            async fn append_location(
                &self,
                _table: &str,
                _group_id: &GroupId,
                _location: &str,
            ) -> Result<(), StorageError> {
                unreachable!()
            }
            async fn get_locations(
                &self,
                _table: &str,
                _group_id: &GroupId,
            ) -> Result<Vec<String>, StorageError> {
                unreachable!()
            }
        }

        let orchestrator = UploadOrchestrator::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(BrokenTable),
            classifier(),
            Arc::new(CountingDescriber),
            TransferLocation::new("bucket", "table"),
        );
        let err = orchestrator.upload_files(vec![PathBuf::from("g1_a.dcm")]).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Storage(StorageError::AccessDenied { .. })
        ));
        assert_eq!(orchestrator.phase(), RunPhase::Completed);
    }
}
