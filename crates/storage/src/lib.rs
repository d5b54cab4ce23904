//! Storage abstraction and transfer orchestration for dicom-transfer.
//!
//! This crate defines the capabilities the transfer core consumes and the
//! orchestrators built on them:
//!
//! - **ObjectStore** - Bucket/key object storage (S3 in production)
//! - **MetadataStore** - Per-group documents and recorded member locations
//! - **UploadOrchestrator** - Classify, describe and upload groups over nested pools
//! - **DownloadOrchestrator** - Fetch every recorded member of one group
//!
//! Backends live in separate crates. The `memory` module provides in-process
//! stores with fault injection for tests and dry runs.
//!
//! # Observability
//!
//! An orchestrator given a [`TransferMetrics`] handle with `with_metrics`
//! records counts, failures, bytes and wall-clock spans per operation into
//! that handle's Prometheus registry. Share one handle to report across runs.

mod download;
mod error;
pub mod memory;
mod metrics;
mod traits;
mod types;
mod upload;

pub use download::{DownloadOptions, DownloadOrchestrator};
pub use error::{GroupFailure, OrchestratorError, StorageError, TransferError};
pub use metrics::{
    OperationMetrics, TransferMetrics, METADATA_WRITE, OBJECT_DOWNLOAD, OBJECT_UPLOAD,
    TOTAL_EXECUTION,
};
pub use traits::{MetadataStore, ObjectInfo, ObjectStore};
pub use types::{
    AwsCredentials, DownloadReport, FileOutcome, GroupOutcome, OperationType, PhaseTracker,
    RunPhase, StorageSettings, TransferLocation, TransferProgress, TransferStatistics,
    UploadReport,
};
pub use upload::{UploadOptions, UploadOrchestrator};
