//! Group identifier type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidGroupId;

/// Identifier of a transfer group.
///
/// Always non-empty, trimmed, and free of `/` and control characters so it can
/// be used verbatim as an object-key segment and a metadata-store key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    /// Validate and create a group identifier.
    ///
    /// Surrounding whitespace and NUL padding are stripped first.
    ///
    /// # Errors
    /// Returns `InvalidGroupId` if the value is empty after trimming or contains
    /// a `/` or control character.
    pub fn new(value: impl AsRef<str>) -> Result<Self, InvalidGroupId> {
        let raw: &str = value.as_ref();
        let trimmed: &str = raw.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if trimmed.is_empty() {
            return Err(InvalidGroupId {
                value: raw.to_string(),
                reason: "empty",
            });
        }
        if trimmed.contains('/') {
            return Err(InvalidGroupId {
                value: raw.to_string(),
                reason: "contains '/'",
            });
        }
        if trimmed.chars().any(char::is_control) {
            return Err(InvalidGroupId {
                value: raw.to_string(),
                reason: "contains control characters",
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GroupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GroupId {
    type Error = InvalidGroupId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for GroupId {
    type Error = InvalidGroupId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.0
    }
}
