//! DICOM support for dicom-transfer.
//!
//! This crate reads just enough of a DICOM Part-10 file to group and describe
//! studies:
//!
//! - **Reader** - Opens files with `dicom-object`, stopping before Pixel Data,
//!   and collects selected string elements
//! - **Classifier** - Groups files by Study Instance UID
//! - **Describer** - Builds the study metadata document stored per study

mod classifier;
mod describer;
mod error;
mod reader;
mod tags;

#[cfg(test)]
pub(crate) mod test_support;

pub use classifier::DicomClassifier;
pub use describer::{extract_study_metadata, write_descriptor_file, DicomDescriber};
pub use error::{DicomError, ParseError};
pub use reader::{is_dicom_file, read_tags, DicomTags};
pub use tags::{parse_tag_key, Tag, PIXEL_DATA, STUDY_INSTANCE_UID, STUDY_TAGS, TRANSFER_SYNTAX_UID};
