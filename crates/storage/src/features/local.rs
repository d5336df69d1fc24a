use super::{AttributeFetch, DirectoryCreation, Existence, HomeLocation, Listing, RemoveEntry};
use crate::backend::LocalBackend;
use crate::entry::{Entry, EntryType};
use crate::error::{ErrorKind, Result};
use crate::models::Attributes;
use async_trait::async_trait;
use tracing::instrument;

/// Features of a local directory tree: native directories, so no
/// placeholders are ever needed.
#[derive(Debug, Clone)]
pub struct LocalFeatures {
    backend: LocalBackend,
}

impl LocalFeatures {
    pub fn new(backend: LocalBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &LocalBackend {
        &self.backend
    }

    fn anchor_volume(&self) -> Option<Entry> {
        self.backend.anchor().and_then(|anchor| Entry::volume(anchor).ok())
    }
}

#[async_trait]
impl Listing for LocalFeatures {
    async fn list(&self, directory: &Entry) -> Result<Vec<Entry>> {
        self.backend.list(directory).await
    }

    /// The anchor when one is set, otherwise the directories at the root.
    async fn containers(&self) -> Result<Vec<Entry>> {
        if self.backend.anchor().is_some() {
            return Ok(self.anchor_volume().into_iter().collect());
        }
        let mut entries = tokio::fs::read_dir(self.backend.root()).await.map_err(ErrorKind::Io)?;
        let mut containers = Vec::new();
        while let Some(item) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            if !item.file_type().await.map_err(ErrorKind::Io)?.is_dir() {
                continue;
            }
            if let Some(volume) = item.file_name().to_str().and_then(|name| Entry::volume(name).ok()) {
                containers.push(volume);
            }
        }
        containers.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(containers)
    }
}

#[async_trait]
impl Existence for LocalFeatures {
    async fn exists(&self, entry: &Entry) -> Result<bool> {
        self.backend.exists(entry.path()).await
    }
}

#[async_trait]
impl AttributeFetch for LocalFeatures {
    async fn attributes(&self, entry: &Entry) -> Result<Attributes> {
        self.backend.stat(entry.path()).await
    }
}

#[async_trait]
impl DirectoryCreation for LocalFeatures {
    #[instrument(skip(self, entry), fields(backend = self.backend.name(), path = %entry.path().display()))]
    async fn mkdir(&self, entry: &Entry, _region: Option<&str>) -> Result<Entry> {
        if !entry.is_directory() {
            exn::bail!(ErrorKind::InvalidTypeTransition(entry.path().to_path_buf()));
        }
        if self.backend.exists(entry.path()).await? {
            exn::bail!(ErrorKind::AlreadyExists(entry.path().to_path_buf()));
        }
        self.backend.create_dir(entry.path()).await?;
        tracing::info!("Created directory");
        entry.clone().with_kind(entry.kind().without(EntryType::PLACEHOLDER))
    }
}

#[async_trait]
impl RemoveEntry for LocalFeatures {
    async fn remove(&self, entry: &Entry) -> Result<()> {
        self.backend.remove(entry.path(), entry.is_directory()).await
    }
}

#[async_trait]
impl HomeLocation for LocalFeatures {
    async fn home(&self, explicit: Option<&str>) -> Result<Entry> {
        match explicit {
            Some(name) => Entry::volume(name),
            None => self.anchor_volume().ok_or_else(|| exn::Exn::from(ErrorKind::NoDefaultContainer)),
        }
    }
}
