//! Local filesystem backend.
//!
//! This module provides access to a directory tree on the local filesystem,
//! a backend family with native directories. Files are accessed using
//! `tokio::fs` for async I/O.

use crate::entry::{Entry, EntryType};
use crate::error::{ErrorKind, Result};
use crate::models::Attributes;
use crate::path::validate as validate_path;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;

/// Local filesystem backend.
///
/// All entries are resolved relative to the configured root directory. When
/// paired with a remote home such as the bucket `photos`, set the anchor with
/// [`with_anchor`](Self::with_anchor) so that the entry `photos/2024/a.jpg`
/// resolves to `<root>/2024/a.jpg`.
///
/// # Examples
///
/// ```no_run
/// use duet_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/home/me/Photos")?.with_anchor("photos")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory of the local replica
    root: PathBuf,
    /// Entry path that maps onto `root`
    anchor: Option<PathBuf>,
}

impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists and is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self {
            name: name.into(),
            root,
            anchor: None,
        })
    }

    /// Map entries below `anchor` onto the root directory.
    pub fn with_anchor(mut self, anchor: impl AsRef<Path>) -> Result<Self> {
        self.anchor = Some(validate_path(anchor)?);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn anchor(&self) -> Option<&Path> {
        self.anchor.as_deref()
    }

    /// Absolute filesystem path of an entry path.
    pub fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        let relative = match &self.anchor {
            Some(anchor) => validated
                .strip_prefix(anchor)
                .or_raise(|| ErrorKind::InvalidPath(validated.clone()))?
                .to_path_buf(),
            None => validated,
        };
        Ok(self.root.join(relative))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn attributes_of(metadata: &Metadata) -> Result<Attributes> {
        if metadata.is_dir() {
            return Ok(Attributes::directory());
        }
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(Attributes::new(metadata.len(), OffsetDateTime::from(modified)))
    }

    fn entry_type(symlink: bool, metadata: &Metadata) -> EntryType {
        let mut kind = match metadata.is_dir() {
            true => EntryType::DIRECTORY,
            false => EntryType::FILE,
        };
        if symlink {
            kind |= EntryType::SYMLINK;
        }
        kind
    }

    pub async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    /// Attributes of an existing entry. Symbolic links are followed.
    pub async fn stat(&self, path: &Path) -> Result<Attributes> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Self::attributes_of(&metadata)
    }

    /// Children of a directory entry. A missing directory lists as empty, to
    /// stay consistent with object stores.
    pub async fn list(&self, directory: &Entry) -> Result<Vec<Entry>> {
        let abs_path = self.absolute_path(directory.path())?;
        let mut entries = match fs::read_dir(&abs_path).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => exn::bail!(Self::map_io_error(err, directory.path())),
        };
        let mut children = Vec::new();
        while let Some(item) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, directory.path()))? {
            let Some(name) = item.file_name().to_str().map(str::to_string) else {
                tracing::warn!(path = %item.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            let symlink = item.file_type().await.map_err(ErrorKind::Io)?.is_symlink();
            let metadata = match fs::metadata(item.path()).await {
                Ok(metadata) => metadata,
                // Note: silently drop what is most likely a broken symlink.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => exn::bail!(Self::map_io_error(err, &item.path())),
            };
            children.push(directory.child(&name, Self::entry_type(symlink, &metadata))?);
        }
        children.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(children)
    }

    /// Create a single directory; the parent must exist.
    pub async fn create_dir(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::create_dir(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    /// Remove a file, or an empty directory.
    pub async fn remove(&self, path: &Path, directory: bool) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        match directory {
            true => Ok(fs::remove_dir(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?),
            false => Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?),
        }
    }
}
