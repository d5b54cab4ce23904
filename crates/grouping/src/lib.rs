//! File grouping for dicom-transfer.
//!
//! This crate partitions a flat list of files into logical transfer groups:
//!
//! - **GroupId** - Validated identifier of a group (for DICOM, a study UID)
//! - **FileClassifier** - Capability mapping a file to its group
//! - **GroupDescriber** - Capability producing the metadata document for a group
//! - **Grouping** - Partition files into groups plus an unclassified remainder

mod classifier;
mod describer;
mod error;
mod grouping;
mod types;

pub use classifier::FileClassifier;
pub use describer::{GroupDescriber, GroupDocument};
pub use error::{ClassificationError, DescribeError, InvalidGroupId};
pub use grouping::{group_files, FileGrouping};
pub use types::GroupId;
