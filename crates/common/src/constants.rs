//! Shared constants used across dicom-transfer crates.

/// Default object store bucket.
pub const DEFAULT_BUCKET: &str = "dicom-transfer-bucket";

/// Default metadata table.
pub const DEFAULT_TABLE: &str = "dicom-studies";

/// Default AWS region.
pub const DEFAULT_REGION: &str = "ap-south-1";

/// Key prefix under which study members are stored.
pub const STUDY_KEY_PREFIX: &str = "studies";

/// Key prefix under which unclassified files are stored, one sub-prefix per run.
pub const UNCLASSIFIED_KEY_PREFIX: &str = "unclassified";

/// File name used when a study descriptor is uploaded as an artifact.
pub const DESCRIPTOR_FILE_NAME: &str = "metadata.json";

/// Default bound on queued (not yet running) tasks per pool.
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 1000;

/// Default upper bound on concurrent file transfers inside one group.
pub const DEFAULT_FILES_PER_GROUP: usize = 4;

/// Default log file written by the command line tool.
pub const DEFAULT_LOG_FILE: &str = "dicom_transfer.log";
