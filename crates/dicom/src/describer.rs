//! Study descriptor generation.

use std::path::{Path, PathBuf};

use dicom_transfer_grouping::{DescribeError, GroupDescriber, GroupDocument, GroupId};
use serde_json::Value;

use crate::error::DicomError;
use crate::reader::{read_tags, DicomTags};
use crate::tags::{study_tags, Tag};

/// Extract the study-level tags of one file as a JSON object keyed by tag
/// keyword. Tags absent from the file are omitted.
///
/// # Errors
/// Returns a `DicomError` if the file cannot be read or parsed.
pub fn extract_study_metadata(path: &Path) -> Result<GroupDocument, DicomError> {
    let wanted: Vec<(&'static str, Tag)> = study_tags();
    let tags: Vec<Tag> = wanted.iter().map(|(_, tag)| *tag).collect();
    let values: DicomTags = read_tags(path, &tags)?;

    let mut document: GroupDocument = GroupDocument::new();
    for (name, tag) in wanted {
        if let Some(value) = values.get(tag) {
            document.insert(name.to_string(), Value::String(value.to_string()));
        }
    }
    Ok(document)
}

/// Builds study descriptors.
///
/// The descriptor holds the study tags of the first file, a `Files` array with
/// the tags of every readable member, and `TotalFiles`. `StudyInstanceUID` is
/// always the group id.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomDescriber;

impl DicomDescriber {
    pub fn new() -> Self {
        Self
    }
}

impl GroupDescriber for DicomDescriber {
    fn describe(&self, group_id: &GroupId, files: &[PathBuf]) -> Result<GroupDocument, DescribeError> {
        let (first, rest): (&PathBuf, &[PathBuf]) =
            files.split_first().ok_or_else(|| DescribeError::EmptyGroup {
                group_id: group_id.to_string(),
            })?;

        let mut document: GroupDocument =
            extract_study_metadata(first).map_err(|err| DescribeError::InvalidMember {
                group_id: group_id.to_string(),
                path: first.clone(),
                message: err.to_string(),
            })?;

        let mut members: Vec<Value> = Vec::with_capacity(files.len());
        members.push(Value::Object(document.clone()));
        for path in rest {
            match extract_study_metadata(path) {
                Ok(file_document) => members.push(Value::Object(file_document)),
                Err(err) => {
                    tracing::warn!(group_id = %group_id, path = %path.display(), error = %err, "skipping unreadable member in descriptor");
                }
            }
        }

        document.insert("Files".into(), Value::Array(members));
        document.insert("TotalFiles".into(), Value::from(files.len()));
        document.insert("StudyInstanceUID".into(), Value::String(group_id.to_string()));
        Ok(document)
    }
}

/// Write a descriptor as pretty-printed JSON.
///
/// # Errors
/// Returns `Descriptor` if serialization or the write fails.
pub fn write_descriptor_file(document: &GroupDocument, path: &Path) -> Result<(), DicomError> {
    let descriptor_error = |message: String| DicomError::Descriptor {
        path: path.to_path_buf(),
        message,
    };
    let bytes: Vec<u8> =
        serde_json::to_vec_pretty(document).map_err(|e| descriptor_error(e.to_string()))?;
    std::fs::write(path, bytes).map_err(|e| descriptor_error(e.to_string()))?;
    tracing::info!(path = %path.display(), "generated descriptor file");
    Ok(())
}
