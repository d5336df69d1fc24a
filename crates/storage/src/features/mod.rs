//! Capability-based feature set.
//!
//! Every backend family exposes the same small set of capabilities, one trait
//! each, so that callers never branch on the kind of backend they talk to:
//!
//! - [`Listing`]: children of a directory, and the top-level containers.
//! - [`Existence`]: does an entry resolve on the backend?
//! - [`AttributeFetch`]: size and modification time of an existing entry.
//! - [`DirectoryCreation`]: materialise a directory (or volume).
//! - [`Deletion`]: delete an ordered batch of entries.
//! - [`HomeLocation`]: the natural root container of a session.
//!
//! Implementations are bound to exactly one session when a [`Features`]
//! bundle is built. Behaviour shared between families ([`DefaultFind`],
//! [`BatchDelete`]) is composed by delegation.

mod default;
mod delete;
mod local;
mod object;

pub use self::default::DefaultFind;
pub use self::delete::{BatchDelete, DeleteProgress, RemoveEntry, check_order};
pub use self::local::LocalFeatures;
pub use self::object::{ObjectDirectory, ObjectFeatures, ObjectFind};
use crate::ObjectHandle;
use crate::backend::LocalBackend;
use crate::entry::Entry;
use crate::error::{ErrorKind, Result};
use crate::models::{Attributes, Presence};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Listing: Send + Sync {
    /// Immediate children of a directory. A directory that does not exist
    /// lists as empty.
    async fn list(&self, directory: &Entry) -> Result<Vec<Entry>>;

    /// Top-level containers (volumes).
    async fn containers(&self) -> Result<Vec<Entry>>;
}

#[async_trait]
pub trait Existence: Send + Sync {
    /// Whether the entry resolves on the backend. Never mutates state.
    async fn exists(&self, entry: &Entry) -> Result<bool>;
}

#[async_trait]
pub trait AttributeFetch: Send + Sync {
    /// Attributes of an existing entry, [`NotFound`](ErrorKind::NotFound)
    /// otherwise.
    async fn attributes(&self, entry: &Entry) -> Result<Attributes>;
}

#[async_trait]
pub trait DirectoryCreation: Send + Sync {
    /// Create a directory, returning the entry with its type tags updated to
    /// reflect how the directory was materialised.
    ///
    /// # Errors
    ///
    /// - [`AlreadyExists`](ErrorKind::AlreadyExists) if the entry already
    ///   resolves on the backend.
    /// - [`PermissionDenied`](ErrorKind::PermissionDenied) on authorisation
    ///   failure.
    /// - [`BackendUnavailable`](ErrorKind::BackendUnavailable) on transport
    ///   failure; the caller may retry.
    /// - [`InconsistentDirectoryState`](ErrorKind::InconsistentDirectoryState)
    ///   if the directory cannot be verified after creation.
    async fn mkdir(&self, entry: &Entry, region: Option<&str>) -> Result<Entry>;
}

#[async_trait]
pub trait Deletion: Send + Sync {
    /// Delete a batch of entries, children before their parents.
    ///
    /// Progress is reported once per entry. A failing entry does not abort
    /// the batch; the call then ends with
    /// [`PartialDeleteFailure`](ErrorKind::PartialDeleteFailure).
    async fn delete(&self, entries: &[Entry], progress: &mut (dyn for<'p> FnMut(DeleteProgress<'p>) + Send)) -> Result<()>;
}

#[async_trait]
pub trait HomeLocation: Send + Sync {
    /// The container to use as default ancestor for new subtrees: `explicit`
    /// if given, otherwise the session's default.
    ///
    /// Fails with [`NoDefaultContainer`](ErrorKind::NoDefaultContainer) when
    /// neither is available.
    async fn home(&self, explicit: Option<&str>) -> Result<Entry>;
}

/// One implementation per capability, all bound to the same session.
#[derive(Clone)]
pub struct Features {
    name: String,
    pub listing: Arc<dyn Listing>,
    pub existence: Arc<dyn Existence>,
    pub attributes: Arc<dyn AttributeFetch>,
    pub directories: Arc<dyn DirectoryCreation>,
    pub deletion: Arc<dyn Deletion>,
    pub home: Arc<dyn HomeLocation>,
}

impl Features {
    /// Features of an object store session: directories are emulated with
    /// placeholder objects and containers are buckets.
    pub fn object_store(handle: ObjectHandle) -> Self {
        let common = Arc::new(ObjectFeatures::new(handle.clone()));
        let find = ObjectFind::new(handle.clone());
        let default = DefaultFind::new(common.clone());
        Self {
            name: handle.name().to_string(),
            listing: common.clone(),
            existence: Arc::new(find.clone()),
            attributes: common.clone(),
            directories: Arc::new(ObjectDirectory::new(handle.clone(), find, default)),
            deletion: Arc::new(BatchDelete::new(common.clone())),
            home: common,
        }
    }

    /// Features of a local directory tree with native directories.
    pub fn local(backend: LocalBackend) -> Self {
        let local = Arc::new(LocalFeatures::new(backend));
        Self {
            name: local.backend().name().to_string(),
            listing: local.clone(),
            existence: local.clone(),
            attributes: local.clone(),
            directories: local.clone(),
            deletion: Arc::new(BatchDelete::new(local.clone())),
            home: local,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generic existence check by listing, bound to the same session.
    pub fn default_find(&self) -> DefaultFind {
        DefaultFind::new(self.listing.clone())
    }

    /// Probe one side of an entry: existence first, then attributes.
    pub async fn probe(&self, entry: &Entry) -> Result<Presence> {
        if !self.existence.exists(entry).await? {
            return Ok(Presence::Absent);
        }
        match self.attributes.attributes(entry).await {
            Ok(attributes) => Ok(Presence::Present(attributes)),
            // Removed between the two calls.
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(Presence::Absent),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for Features {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Features").field("name", &self.name).finish_non_exhaustive()
    }
}
