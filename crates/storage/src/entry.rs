//! The dual-sided path model.
//!
//! An [`Entry`] describes one logical file or directory that may exist on the
//! local side, the remote side, or both. Probing fills in each side's
//! [`Presence`]; the reconciliation engine then compares the two.

use crate::error::{ErrorKind, Result};
use crate::models::Presence;
use crate::path::{self, SEPARATOR};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};

/// Set of orthogonal type tags carried by an [`Entry`].
///
/// A valid set holds exactly one of [`FILE`](Self::FILE) or
/// [`DIRECTORY`](Self::DIRECTORY). [`VOLUME`](Self::VOLUME) (a root
/// container such as a bucket) and [`PLACEHOLDER`](Self::PLACEHOLDER) (a
/// directory emulated by a marker object) may only accompany `DIRECTORY`, and
/// never each other. [`SYMLINK`](Self::SYMLINK) may accompany either.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EntryType(u8);

impl EntryType {
    pub const FILE: Self = Self(1);
    pub const DIRECTORY: Self = Self(1 << 1);
    pub const VOLUME: Self = Self(1 << 2);
    pub const PLACEHOLDER: Self = Self(1 << 3);
    pub const SYMLINK: Self = Self(1 << 4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn is_valid(self) -> bool {
        let file = self.contains(Self::FILE);
        let directory = self.contains(Self::DIRECTORY);
        if file == directory {
            return false;
        }
        let volume = self.contains(Self::VOLUME);
        let placeholder = self.contains(Self::PLACEHOLDER);
        if (volume || placeholder) && !directory {
            return false;
        }
        !(volume && placeholder)
    }
}
impl BitOr for EntryType {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
impl BitOrAssign for EntryType {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
impl fmt::Debug for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::FILE, "file"),
            (Self::DIRECTORY, "directory"),
            (Self::VOLUME, "volume"),
            (Self::PLACEHOLDER, "placeholder"),
            (Self::SYMLINK, "symlink"),
        ];
        f.debug_set().entries(names.iter().filter(|(tag, _)| self.contains(*tag)).map(|(_, name)| name)).finish()
    }
}

/// A logical resource, with independently probed local and remote sides.
///
/// Identity is structural: two entries with the same path denote the same
/// resource regardless of what has been probed about them, so equality and
/// hashing only consider the path.
#[derive(Debug, Clone)]
pub struct Entry {
    path: PathBuf,
    kind: EntryType,
    local: Presence,
    remote: Presence,
    skip: bool,
}

impl Entry {
    /// Create an entry for a validated path.
    ///
    /// Fails with [`InvalidPath`](ErrorKind::InvalidPath) for invalid paths
    /// and [`InvalidTypeTransition`](ErrorKind::InvalidTypeTransition) for an
    /// invalid tag set (including a volume that is not a single component).
    pub fn new(path: impl AsRef<Path>, kind: EntryType) -> Result<Self> {
        let path = path::validate(path)?;
        Self::check_kind(&path, kind)?;
        Ok(Self {
            path,
            kind,
            local: Presence::Unprobed,
            remote: Presence::Unprobed,
            skip: false,
        })
    }

    /// A root container (bucket).
    pub fn volume(name: impl AsRef<Path>) -> Result<Self> {
        Self::new(name, EntryType::DIRECTORY | EntryType::VOLUME)
    }

    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(path, EntryType::FILE)
    }

    pub fn directory(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(path, EntryType::DIRECTORY)
    }

    /// Create a child of this directory.
    pub fn child(&self, name: &str, kind: EntryType) -> Result<Self> {
        if !self.is_directory() || name.is_empty() || name.contains(SEPARATOR) {
            exn::bail!(ErrorKind::InvalidPath(self.path.join(name)));
        }
        Self::new(self.path.join(name), kind)
    }

    fn check_kind(path: &Path, kind: EntryType) -> Result<()> {
        let single = path.components().count() == 1;
        if !kind.is_valid() || (kind.contains(EntryType::VOLUME) && !single) {
            exn::bail!(ErrorKind::InvalidTypeTransition(path.to_path_buf()));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leaf name.
    pub fn name(&self) -> &str {
        // Paths are validated as UTF-8 and non-empty on construction.
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    }

    /// Parent directory, or `None` for a top-level entry.
    pub fn parent(&self) -> Option<Entry> {
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty())?;
        Entry::directory(parent).ok()
    }

    /// First path component: the container on container-based backends.
    pub fn container(&self) -> &str {
        self.path.components().next().and_then(|c| c.as_os_str().to_str()).unwrap_or_default()
    }

    /// Key of this entry below its container, `None` for a top-level entry.
    pub fn key(&self) -> Option<String> {
        path::object_key(&self.path).ok().flatten()
    }

    pub fn kind(&self) -> EntryType {
        self.kind
    }

    /// Replace the type tags.
    ///
    /// Fails with [`InvalidTypeTransition`](ErrorKind::InvalidTypeTransition)
    /// and leaves the entry unchanged if the new set is invalid.
    pub fn set_kind(&mut self, kind: EntryType) -> Result<()> {
        Self::check_kind(&self.path, kind)?;
        self.kind = kind;
        Ok(())
    }

    pub fn with_kind(mut self, kind: EntryType) -> Result<Self> {
        self.set_kind(kind)?;
        Ok(self)
    }

    pub fn is_file(&self) -> bool {
        self.kind.contains(EntryType::FILE)
    }

    pub fn is_directory(&self) -> bool {
        self.kind.contains(EntryType::DIRECTORY)
    }

    pub fn is_volume(&self) -> bool {
        self.kind.contains(EntryType::VOLUME)
    }

    pub fn is_placeholder(&self) -> bool {
        self.kind.contains(EntryType::PLACEHOLDER)
    }

    pub fn local(&self) -> &Presence {
        &self.local
    }

    pub fn remote(&self) -> &Presence {
        &self.remote
    }

    /// Record the outcome of probing the local side.
    pub fn record_local(&mut self, presence: Presence) {
        self.local = presence;
    }

    /// Record the outcome of probing the remote side.
    pub fn record_remote(&mut self, presence: Presence) {
        self.remote = presence;
    }

    pub fn skip(&self) -> bool {
        self.skip
    }

    pub fn set_skip(&mut self, skip: bool) {
        self.skip = skip;
    }

    /// `true` when both sides have been probed successfully.
    pub fn is_probed(&self) -> bool {
        self.local.is_probed() && self.remote.is_probed()
    }

    /// Compare the two sides.
    ///
    /// - [`Greater`](Ordering::Greater): the remote side is newer, or only
    ///   the remote side exists.
    /// - [`Less`](Ordering::Less): the local side is newer, or only the local
    ///   side exists.
    /// - [`Equal`](Ordering::Equal): same modification time (compared to the
    ///   second, as most object stores report no finer precision), or a side
    ///   reports no timestamp at all.
    ///
    /// Fails with [`IndeterminateState`](ErrorKind::IndeterminateState) if
    /// either side is unprobed or unknown, or neither side exists.
    pub fn compare(&self) -> Result<Ordering> {
        match (&self.local, &self.remote) {
            (Presence::Present(local), Presence::Present(remote)) => Ok(match (local.modified, remote.modified) {
                (Some(local), Some(remote)) => remote.unix_timestamp().cmp(&local.unix_timestamp()),
                _ => Ordering::Equal,
            }),
            (Presence::Absent, Presence::Present(_)) => Ok(Ordering::Greater),
            (Presence::Present(_), Presence::Absent) => Ok(Ordering::Less),
            _ => exn::bail!(ErrorKind::IndeterminateState(self.path.clone())),
        }
    }
}
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}
impl Eq for Entry {}
impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}
