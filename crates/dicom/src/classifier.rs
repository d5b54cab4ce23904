//! Study-based file classification.

use std::path::Path;

use dicom_transfer_grouping::{ClassificationError, FileClassifier, GroupId};

use crate::error::DicomError;
use crate::reader::{read_tags, DicomTags};
use crate::tags::STUDY_INSTANCE_UID;

/// Classifies DICOM files by Study Instance UID (0020,000D).
///
/// Non-DICOM files, unreadable files and files without a study UID are left
/// unclassified.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomClassifier;

impl DicomClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl FileClassifier for DicomClassifier {
    fn classify(&self, path: &Path) -> Result<GroupId, ClassificationError> {
        let tags: DicomTags = read_tags(path, &[STUDY_INSTANCE_UID]).map_err(|err| match err {
            DicomError::Io { message, .. } => ClassificationError::Io {
                path: path.to_path_buf(),
                message,
            },
            other => ClassificationError::NotRecognized {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })?;

        let missing = || ClassificationError::MissingGroupId {
            path: path.to_path_buf(),
        };
        let uid: &str = tags.get(STUDY_INSTANCE_UID).ok_or_else(missing)?;
        GroupId::new(uid).map_err(|_| missing())
    }
}
