//! End-to-end upload and download scenarios against the in-memory stores.
//!
//! Files named `<group>_<n>.dcm` are classified into `<group>`; any other name
//! is unclassified.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dicom_transfer_common::progress_fn;
use dicom_transfer_filesystem::ScanOptions;
use dicom_transfer_grouping::{
    ClassificationError, DescribeError, FileClassifier, GroupDescriber, GroupDocument, GroupId,
};
use dicom_transfer_storage::memory::{InMemoryMetadataStore, InMemoryObjectStore};
use dicom_transfer_storage::{
    DownloadOptions, DownloadOrchestrator, GroupFailure, MetadataStore, ObjectStore,
    OrchestratorError, RunPhase, StorageError, TransferLocation, TransferProgress, UploadOptions,
    UploadOrchestrator,
};
use serde_json::Value;
use tempfile::TempDir;

const BUCKET: &str = "bucket";
const TABLE: &str = "table";

struct NameClassifier;

impl FileClassifier for NameClassifier {
    fn classify(&self, path: &Path) -> Result<GroupId, ClassificationError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let missing = || ClassificationError::MissingGroupId {
            path: path.to_path_buf(),
        };
        let (group, _) = name.split_once('_').ok_or_else(missing)?;
        GroupId::new(group).map_err(|_| missing())
    }
}

struct FileListDescriber;

impl GroupDescriber for FileListDescriber {
    fn describe(&self, group_id: &GroupId, files: &[PathBuf]) -> Result<GroupDocument, DescribeError> {
        let mut document = GroupDocument::new();
        document.insert("GroupId".into(), Value::String(group_id.to_string()));
        document.insert("TotalFiles".into(), Value::from(files.len()));
        Ok(document)
    }
}

struct Fixture {
    dir: TempDir,
    objects: Arc<InMemoryObjectStore>,
    metadata: Arc<InMemoryMetadataStore>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_objects(InMemoryObjectStore::new())
    }

    fn with_objects(objects: InMemoryObjectStore) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            objects: Arc::new(objects),
            metadata: Arc::new(InMemoryMetadataStore::new()),
        }
    }

    fn file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("contents of {name}")).unwrap();
        path
    }

    fn uploader(&self, options: UploadOptions) -> UploadOrchestrator {
        UploadOrchestrator::new(
            Arc::clone(&self.objects) as Arc<dyn ObjectStore>,
            Arc::clone(&self.metadata) as Arc<dyn MetadataStore>,
            Arc::new(NameClassifier),
            Arc::new(FileListDescriber),
            TransferLocation::new(BUCKET, TABLE),
        )
        .with_options(options)
    }

    fn downloader(&self) -> DownloadOrchestrator {
        DownloadOrchestrator::new(
            Arc::clone(&self.objects) as Arc<dyn ObjectStore>,
            Arc::clone(&self.metadata) as Arc<dyn MetadataStore>,
            TransferLocation::new(BUCKET, TABLE),
        )
        .with_options(DownloadOptions::new(4))
    }
}

fn gid(value: &str) -> GroupId {
    GroupId::new(value).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_upload_two_groups_and_unclassified() {
    let fx = Fixture::new();
    fx.file("s1_a.dcm");
    fx.file("s1_b.dcm");
    fx.file("s2_a.dcm");
    fx.file("notes.txt");

    let uploader = fx.uploader(UploadOptions::new(4));
    let report = uploader
        .upload_directory(ScanOptions::new(fx.dir.path()))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(uploader.phase(), RunPhase::Completed);
    assert_eq!(fx.metadata.groups(TABLE), vec![gid("s1"), gid("s2")]);

    let s1 = fx.metadata.get_locations(TABLE, &gid("s1")).await.unwrap();
    let s2 = fx.metadata.get_locations(TABLE, &gid("s2")).await.unwrap();
    assert_eq!(s1, vec!["studies/s1/s1_a.dcm", "studies/s1/s1_b.dcm"]);
    assert_eq!(s2, vec!["studies/s2/s2_a.dcm"]);

    let loose: Vec<String> = fx
        .objects
        .keys(BUCKET)
        .into_iter()
        .filter(|k| k.starts_with("unclassified/"))
        .collect();
    assert_eq!(
        loose,
        vec![format!("unclassified/{}/notes.txt", report.run_id)]
    );
    assert_eq!(report.unclassified.len(), 1);
    assert_eq!(report.statistics.files_transferred, 4);

    let document = fx.metadata.document(TABLE, &gid("s1")).unwrap();
    assert_eq!(document["TotalFiles"], Value::from(2));
}

#[tokio::test]
async fn test_download_unknown_group_submits_nothing() {
    let fx = Fixture::new();
    fx.metadata.ensure_table(TABLE).await.unwrap();
    let out = TempDir::new().unwrap();

    let err = fx
        .downloader()
        .download_group(&gid("missing"), out.path())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::GroupNotFound { ref group_id } if group_id == "missing"));
    assert_eq!(fx.objects.get_calls(), 0);
}

#[tokio::test]
async fn test_download_group_without_locations() {
    let fx = Fixture::new();
    fx.metadata.ensure_table(TABLE).await.unwrap();
    fx.metadata
        .put_group_document(TABLE, &gid("empty"), &GroupDocument::new())
        .await
        .unwrap();
    let out = TempDir::new().unwrap();

    let err = fx
        .downloader()
        .download_group(&gid("empty"), out.path())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::NoFilesForGroup { .. }));
    assert_eq!(fx.objects.get_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_document_failure_skips_only_that_group() {
    let fx = Fixture::new();
    let files = vec![
        fx.file("bad_1.dcm"),
        fx.file("bad_2.dcm"),
        fx.file("good_1.dcm"),
    ];
    fx.metadata.fail_documents_for(&gid("bad"));

    let report = fx.uploader(UploadOptions::new(4)).upload_files(files).await.unwrap();

    assert!(!report.is_success());
    let failed = report.failed_groups();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].group_id, gid("bad"));
    assert!(matches!(failed[0].failure, Some(GroupFailure::Metadata(_))));
    assert!(failed[0].files.is_empty());

    // Only the healthy group's member reached the object store.
    assert_eq!(fx.objects.put_calls(), 1);
    assert_eq!(fx.objects.keys(BUCKET), vec!["studies/good/good_1.dcm"]);
    assert!(fx
        .metadata
        .get_locations(TABLE, &gid("bad"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_failing_file_does_not_stop_siblings() {
    let fx = Fixture::new();
    let files: Vec<PathBuf> = (1..=5).map(|n| fx.file(&format!("g_{n}.dcm"))).collect();
    fx.objects.fail_puts_matching("g_3.dcm");

    let report = fx.uploader(UploadOptions::new(4)).upload_files(files).await.unwrap();

    assert!(!report.is_success());
    let group = &report.groups[0];
    assert!(!group.is_success());
    assert!(group.failure.is_none());
    assert_eq!(group.files.len(), 5);
    assert_eq!(group.files.iter().filter(|f| f.is_success()).count(), 4);

    let failed = report.failed_files();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].key, "studies/g/g_3.dcm");
    assert!(matches!(failed[0].error, Some(StorageError::NetworkError { .. })));
    assert_eq!(fx.metadata.get_locations(TABLE, &gid("g")).await.unwrap().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_per_group_concurrency_is_bounded() {
    let fx = Fixture::with_objects(InMemoryObjectStore::new().with_latency(Duration::from_millis(20)));
    let files: Vec<PathBuf> = (0..12).map(|n| fx.file(&format!("big_{n}.dcm"))).collect();

    let report = fx
        .uploader(UploadOptions::new(8).with_files_per_group(2))
        .upload_files(files)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(fx.objects.put_calls(), 12);
    assert!(fx.objects.peak_in_flight() <= 2, "peak {}", fx.objects.peak_in_flight());
}

#[tokio::test]
async fn test_delete_after_upload() {
    let fx = Fixture::new();
    let kept = fx.file("s_1.dcm");
    let removed = fx.file("s_2.dcm");
    fx.objects.fail_puts_matching("s_1.dcm");

    let report = fx
        .uploader(UploadOptions::new(2).with_delete_after_upload(true))
        .upload_files(vec![kept.clone(), removed.clone()])
        .await
        .unwrap();

    // A file is only removed once its upload is confirmed.
    assert!(kept.exists());
    assert!(!removed.exists());
    assert_eq!(report.failed_files().len(), 1);
}

#[tokio::test]
async fn test_cleanup_failure_is_not_fatal() {
    let fx = Fixture::new();
    let path = fx.file("s_1.dcm");

    // Remove the local file as soon as the object is stored, so the
    // post-upload cleanup finds nothing to delete.
    let dir = fx.dir.path().to_path_buf();
    let sink = progress_fn(move |progress: &TransferProgress| {
        let name = progress.key.rsplit('/').next().unwrap_or_default();
        let _ = std::fs::remove_file(dir.join(name));
    });
    let report = fx
        .uploader(UploadOptions::new(1).with_delete_after_upload(true))
        .with_progress(Arc::new(sink))
        .upload_files(vec![path.clone()])
        .await
        .unwrap();

    assert!(report.is_success());
    let outcome = &report.groups[0].files[0];
    assert!(outcome.is_success());
    assert!(outcome.cleanup_error.is_some());
    assert!(fx.objects.object(BUCKET, "studies/s/s_1.dcm").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_upload_then_download_round_trip() {
    let fx = Fixture::new();
    let files = vec![fx.file("rt_a.dcm"), fx.file("rt_b.dcm")];
    let report = fx.uploader(UploadOptions::new(2)).upload_files(files).await.unwrap();
    assert!(report.is_success());

    let out = TempDir::new().unwrap();
    let downloaded = fx
        .downloader()
        .download_group(&gid("rt"), out.path())
        .await
        .unwrap();

    assert!(downloaded.is_success());
    assert_eq!(downloaded.document["GroupId"], Value::String("rt".into()));
    assert_eq!(
        std::fs::read_to_string(out.path().join("rt_b.dcm")).unwrap(),
        "contents of rt_b.dcm"
    );
    assert_eq!(
        downloaded.statistics.bytes_transferred,
        report.statistics.bytes_transferred
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_groups_are_bounded() {
    let fx = Fixture::with_objects(InMemoryObjectStore::new().with_latency(Duration::from_millis(20)));
    let files: Vec<PathBuf> = (0..6)
        .flat_map(|g| (0..3).map(move |n| format!("grp{g}_{n}.dcm")))
        .map(|name| fx.file(&name))
        .collect();

    // One member at a time per group, so overlapping puts mean overlapping groups.
    let report = fx
        .uploader(UploadOptions::new(2).with_files_per_group(1))
        .upload_files(files)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.groups.len(), 6);
    assert_eq!(fx.objects.put_calls(), 18);
    assert!(fx.objects.peak_in_flight() <= 2, "peak {}", fx.objects.peak_in_flight());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unbounded_queues_upload_everything() {
    let fx = Fixture::new();
    let mut files: Vec<PathBuf> = (0..9)
        .map(|n| fx.file(&format!("u{}_{n}.dcm", n % 3)))
        .collect();
    files.push(fx.file("readme.txt"));

    let uploader = fx.uploader(UploadOptions::new(3).with_max_queue_depth(None));
    let report = uploader.upload_files(files).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.groups.len(), 3);
    assert_eq!(report.unclassified.len(), 1);
    assert_eq!(report.statistics.files_transferred, 10);
    assert_eq!(fx.objects.put_calls(), 10);
    assert_eq!(uploader.phase(), RunPhase::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_large_input_through_single_slot_queue() {
    let fx = Fixture::with_objects(InMemoryObjectStore::new().with_latency(Duration::from_millis(2)));
    let mut files: Vec<PathBuf> = (0..40)
        .map(|n| fx.file(&format!("q{}_{n}.dcm", n % 4)))
        .collect();
    files.extend((0..5).map(|n| fx.file(&format!("loose{n}.txt"))));

    let report = tokio::time::timeout(
        Duration::from_secs(30),
        fx.uploader(UploadOptions::new(2).with_max_queue_depth(Some(1)))
            .upload_files(files),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(report.is_success());
    assert_eq!(report.groups.len(), 4);
    assert!(report.groups.iter().all(|g| g.files.len() == 10));
    assert_eq!(report.unclassified.len(), 5);
    assert_eq!(report.statistics.files_transferred, 45);
    for group in ["q0", "q1", "q2", "q3"] {
        assert_eq!(fx.metadata.get_locations(TABLE, &gid(group)).await.unwrap().len(), 10);
    }
}
