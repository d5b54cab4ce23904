//! Upload and download commands.

use std::sync::Arc;

use anyhow::Context;
use dicom_transfer_common::{format_bytes, DESCRIPTOR_FILE_NAME};
use dicom_transfer_dicom::{write_descriptor_file, DicomClassifier, DicomDescriber};
use dicom_transfer_filesystem::{GlobFilter, ScanOptions};
use dicom_transfer_grouping::GroupId;
use dicom_transfer_storage::{
    DownloadOptions, DownloadOrchestrator, DownloadReport, MetadataStore, ObjectStore,
    StorageSettings, TransferMetrics, UploadOptions, UploadOrchestrator, UploadReport,
};
use dicom_transfer_storage_aws::{load_sdk_config, DynamoMetadataStore, S3ObjectStore};

use crate::args::{resolve_queue_depth, resolve_threads, DownloadArgs, UploadArgs};

/// Remote stores shared by every task of a run.
struct Stores {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl Stores {
    async fn connect(settings: &StorageSettings) -> Self {
        let sdk_config = load_sdk_config(settings).await;
        Self {
            objects: Arc::new(S3ObjectStore::from_config(
                &sdk_config,
                settings.endpoint_url.is_some(),
            )),
            metadata: Arc::new(DynamoMetadataStore::from_config(&sdk_config)),
        }
    }
}

pub fn upload_options(args: &UploadArgs) -> UploadOptions {
    let threads: usize = resolve_threads(args.threads);
    let mut options: UploadOptions = UploadOptions::new(threads)
        .with_max_queue_depth(resolve_queue_depth(args.queue_depth))
        .with_delete_after_upload(args.delete_after_upload)
        .with_upload_descriptor(args.upload_descriptor);
    if let Some(files_per_study) = args.files_per_study.filter(|n| *n > 0) {
        options = options.with_files_per_group(files_per_study);
    }
    options
}

pub fn scan_options(args: &UploadArgs) -> anyhow::Result<ScanOptions> {
    let filter: GlobFilter = GlobFilter::with_patterns(args.include.clone(), args.exclude.clone())
        .context("invalid --include/--exclude pattern")?;
    Ok(ScanOptions::new(&args.directory)
        .with_recursive(!args.no_recursive)
        .with_filter(filter))
}

/// Upload a directory. Returns whether every study and file succeeded.
pub async fn upload(
    args: UploadArgs,
    settings: StorageSettings,
    metrics: Arc<TransferMetrics>,
) -> anyhow::Result<bool> {
    let options: UploadOptions = upload_options(&args);
    let scan: ScanOptions = scan_options(&args)?;
    tracing::info!(
        directory = %args.directory.display(),
        threads = options.group_workers,
        files_per_study = options.files_per_group,
        bucket = %settings.bucket,
        table = %settings.table,
        "starting upload"
    );

    let stores: Stores = Stores::connect(&settings).await;
    let orchestrator = UploadOrchestrator::new(
        stores.objects,
        stores.metadata,
        Arc::new(DicomClassifier::new()),
        Arc::new(DicomDescriber::new()),
        settings.location(),
    )
    .with_options(options)
    .with_metrics(metrics);

    let report: UploadReport = orchestrator
        .upload_directory(scan)
        .await
        .with_context(|| format!("upload of {} failed", args.directory.display()))?;

    print_upload_summary(&report);
    Ok(report.is_success())
}

/// Download one study. Returns whether every file succeeded.
pub async fn download(
    args: DownloadArgs,
    settings: StorageSettings,
    metrics: Arc<TransferMetrics>,
) -> anyhow::Result<bool> {
    let group_id: GroupId = GroupId::new(&args.study_uid)
        .with_context(|| format!("invalid study UID '{}'", args.study_uid))?;
    let options: DownloadOptions = DownloadOptions::new(resolve_threads(args.threads))
        .with_max_queue_depth(resolve_queue_depth(args.queue_depth));
    tracing::info!(
        study_uid = %group_id,
        output = %args.output.display(),
        threads = options.workers,
        "starting download"
    );

    let stores: Stores = Stores::connect(&settings).await;
    let orchestrator = DownloadOrchestrator::new(stores.objects, stores.metadata, settings.location())
        .with_options(options)
        .with_metrics(metrics);

    let report: DownloadReport = orchestrator
        .download_group(&group_id, &args.output)
        .await
        .with_context(|| format!("download of study {group_id} failed"))?;

    let descriptor = args.output.join(DESCRIPTOR_FILE_NAME);
    write_descriptor_file(&report.document, &descriptor)
        .with_context(|| format!("failed to write {}", descriptor.display()))?;

    print_download_summary(&report);
    Ok(report.is_success())
}

fn print_upload_summary(report: &UploadReport) {
    let stats = &report.statistics;
    println!(
        "Uploaded {} of {} files ({}) in {} studies, {} unclassified, in {:.1}s",
        stats.files_transferred,
        stats.files_processed,
        format_bytes(stats.bytes_transferred),
        report.groups.len(),
        report.unclassified.len(),
        report.elapsed.as_secs_f64()
    );

    for group in report.failed_groups() {
        match &group.failure {
            Some(failure) => println!("  FAILED study {}: {}", group.group_id, failure),
            None => println!(
                "  FAILED study {}: {} file(s) failed",
                group.group_id,
                group.failed_files().count()
            ),
        }
    }
    for file in report.failed_files() {
        if let Some(error) = &file.error {
            println!("  FAILED file {}: {}", file.path.display(), error);
        }
    }
    if !report.unclassified.is_empty() {
        println!(
            "  Unclassified files stored under unclassified/{}/",
            report.run_id
        );
    }
}

fn print_download_summary(report: &DownloadReport) {
    let stats = &report.statistics;
    println!(
        "Downloaded {} of {} files ({}) of study {} to {} in {:.1}s",
        stats.files_transferred,
        stats.files_processed,
        format_bytes(stats.bytes_transferred),
        report.group_id,
        report.output_dir.display(),
        report.elapsed.as_secs_f64()
    );
    for file in report.failed_files() {
        if let Some(error) = &file.error {
            println!("  FAILED {}: {}", file.key, error);
        }
    }
}
