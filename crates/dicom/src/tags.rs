//! DICOM tag keys and the study-level tag set.

use std::fmt;

use crate::error::DicomError;

/// A DICOM data element tag `(group, element)`.
///
/// Ordering follows the on-disk ordering of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }
}

impl From<Tag> for dicom_core::Tag {
    fn from(tag: Tag) -> Self {
        dicom_core::Tag(tag.group, tag.element)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

pub const TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0002, 0x0010);
pub const STUDY_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000D);
pub const PIXEL_DATA: Tag = Tag::new(0x7FE0, 0x0010);

/// Study-level tags copied into a study descriptor, by keyword.
pub const STUDY_TAGS: [(&str, &str); 13] = [
    ("PatientID", "0010,0020"),
    ("PatientName", "0010,0010"),
    ("StudyDate", "0008,0020"),
    ("StudyTime", "0008,0030"),
    ("AccessionNumber", "0008,0050"),
    ("StudyID", "0020,0010"),
    ("StudyInstanceUID", "0020,000D"),
    ("StudyDescription", "0008,1030"),
    ("Modality", "0008,0060"),
    ("SeriesInstanceUID", "0020,000E"),
    ("SeriesNumber", "0020,0011"),
    ("SeriesDescription", "0008,103E"),
    ("SOPInstanceUID", "0008,0018"),
];

/// Parse a tag key of the form `gggg,eeee` (hexadecimal).
///
/// # Errors
/// Returns `InvalidTag` if the comma is missing or either half is not a
/// 16-bit hexadecimal number.
pub fn parse_tag_key(key: &str) -> Result<Tag, DicomError> {
    let invalid = || DicomError::InvalidTag {
        value: key.to_string(),
    };
    let (group, element) = key.split_once(',').ok_or_else(invalid)?;
    let group: u16 = u16::from_str_radix(group.trim(), 16).map_err(|_| invalid())?;
    let element: u16 = u16::from_str_radix(element.trim(), 16).map_err(|_| invalid())?;
    Ok(Tag::new(group, element))
}

/// Parsed form of [`STUDY_TAGS`].
pub(crate) fn study_tags() -> Vec<(&'static str, Tag)> {
    STUDY_TAGS
        .iter()
        .filter_map(|(name, key)| parse_tag_key(key).ok().map(|tag| (*name, tag)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_key() {
        assert_eq!(parse_tag_key("0020,000D").unwrap(), STUDY_INSTANCE_UID);
        assert_eq!(parse_tag_key("7fe0,0010").unwrap(), PIXEL_DATA);
        assert_eq!(parse_tag_key(" 0008 , 103E ").unwrap(), Tag::new(0x0008, 0x103E));
    }

    #[test]
    fn test_parse_tag_key_rejects_bad_input() {
        for bad in ["", "0020000D", "0020,", "zzzz,0001", "10000,0000"] {
            assert!(
                matches!(parse_tag_key(bad), Err(DicomError::InvalidTag { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_all_study_tags_parse() {
        assert_eq!(study_tags().len(), STUDY_TAGS.len());
    }

    #[test]
    fn test_tag_ordering_conversion_and_display() {
        assert!(STUDY_INSTANCE_UID < PIXEL_DATA);
        assert_eq!(dicom_core::Tag::from(PIXEL_DATA), dicom_core::Tag(0x7FE0, 0x0010));
        assert_eq!(STUDY_INSTANCE_UID.to_string(), "(0020,000D)");
    }
}
