//! Storage models.
//!
//! These types represent metadata returned by backends, both for probing a
//! single entry and for listing operations.

use time::OffsetDateTime;

/// Attributes of an entry that exists on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    /// Size in bytes (zero for directories)
    pub size: u64,
    /// Last modified timestamp, if the backend reports one. Prefix-implied
    /// directories on object stores have none.
    pub modified: Option<OffsetDateTime>,
}
impl Attributes {
    pub fn new(size: u64, modified: impl Into<Option<OffsetDateTime>>) -> Self {
        Self { size, modified: modified.into() }
    }

    /// Attributes of a directory without a timestamp.
    pub fn directory() -> Self {
        Self { size: 0, modified: None }
    }
}

/// What is known about one side (local or remote) of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Presence {
    /// Existence has not been checked yet.
    #[default]
    Unprobed,
    /// The probe failed (transient error); existence is unknown.
    Unknown,
    /// Checked: does not exist.
    Absent,
    /// Checked: exists with these attributes.
    Present(Attributes),
}
impl Presence {
    /// `true` once a probe has completed successfully, whatever the answer.
    pub fn is_probed(&self) -> bool {
        matches!(self, Self::Absent | Self::Present(_))
    }

    pub fn exists(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Self::Present(attributes) => Some(attributes),
            _ => None,
        }
    }
}

/// Object metadata returned by object store sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full key within the bucket
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: Option<OffsetDateTime>,
}
impl ObjectInfo {
    pub fn new(key: impl Into<String>, size: u64, modified: impl Into<Option<OffsetDateTime>>) -> Self {
        Self {
            key: key.into(),
            size,
            modified: modified.into(),
        }
    }
}

/// One row of a (possibly delimited) object listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    /// An object key.
    Object(ObjectInfo),
    /// A common prefix (ends with the separator) grouping deeper keys.
    Prefix(String),
}
