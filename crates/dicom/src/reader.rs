//! Tag extraction from DICOM Part-10 files.
//!
//! Parsing is delegated to `dicom-object`; the dataset is read up to, but not
//! including, Pixel Data.

use std::collections::BTreeMap;
use std::path::Path;

use dicom_object::{DefaultDicomObject, OpenFileOptions, ReadError};

use crate::error::{DicomError, ParseError};
use crate::tags::{Tag, PIXEL_DATA};

/// String values collected from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomTags {
    /// Transfer syntax UID declared in the file meta group.
    pub transfer_syntax: String,
    values: BTreeMap<Tag, String>,
}

impl DicomTags {
    /// Value of a tag, if present in the file.
    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.values.get(&tag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &String)> {
        self.values.iter()
    }
}

/// Read selected top-level string elements from a DICOM file.
///
/// # Arguments
/// * `path` - File to read
/// * `tags` - Tags to collect; absent or non-textual elements are left out
///
/// # Errors
/// Returns `Io` if the file cannot be opened, or `Parse` if it is not a
/// well-formed Part-10 file. A file that ends inside an element is malformed.
pub fn read_tags(path: &Path, tags: &[Tag]) -> Result<DicomTags, DicomError> {
    let object: DefaultDicomObject = OpenFileOptions::new()
        .read_until(PIXEL_DATA.into())
        .open_file(path)
        .map_err(|err| read_error(path, err))?;

    let mut values: BTreeMap<Tag, String> = BTreeMap::new();
    for tag in tags {
        let Ok(element) = object.element((*tag).into()) else {
            continue;
        };
        match element.to_str() {
            Ok(text) => {
                values.insert(*tag, first_value(&text));
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), tag = %tag, error = %err, "element is not textual");
            }
        }
    }

    Ok(DicomTags {
        transfer_syntax: object.meta().transfer_syntax().to_string(),
        values,
    })
}

/// Whether a file parses as a DICOM Part-10 file.
pub fn is_dicom_file(path: &Path) -> bool {
    read_tags(path, &[]).is_ok()
}

fn read_error(path: &Path, err: ReadError) -> DicomError {
    let source: ParseError = match err {
        ReadError::OpenFile { source, .. } => return DicomError::io(path, &source),
        meta @ ReadError::ParseMetaDataSet { .. } => ParseError::NotDicom {
            message: meta.to_string(),
        },
        other => ParseError::Malformed {
            message: other.to_string(),
        },
    };
    DicomError::Parse {
        path: path.to_path_buf(),
        source,
    }
}

/// First value of a multi-valued string, padding removed.
fn first_value(text: &str) -> String {
    text.split('\\')
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}
