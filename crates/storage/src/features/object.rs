//! Features of object store sessions.
//!
//! Object stores have no directories. A directory either exists implicitly,
//! because some key starts with its prefix, or is materialised as an empty
//! placeholder object whose key ends with the separator. Top-level entries
//! are buckets.

use super::{AttributeFetch, DefaultFind, DirectoryCreation, Existence, HomeLocation, Listing, RemoveEntry};
use crate::ObjectHandle;
use crate::entry::{Entry, EntryType};
use crate::error::{ErrorKind, Result};
use crate::models::{Attributes, ListItem};
use crate::path::{SEPARATOR, directory_key};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::instrument;

/// Prefix under which the children of `entry` are listed.
fn child_prefix(entry: &Entry) -> String {
    entry.key().map(|key| directory_key(&key)).unwrap_or_default()
}

/// Native existence check.
///
/// Volumes are looked up by bucket name, files by exact key. Directories are
/// recognised by their placeholder object first, then by any key below their
/// prefix.
#[derive(Clone)]
pub struct ObjectFind {
    store: ObjectHandle,
}

impl ObjectFind {
    pub fn new(store: ObjectHandle) -> Self {
        Self { store }
    }

    /// Whether the placeholder object of a directory exists.
    pub async fn marker_exists(&self, entry: &Entry) -> Result<bool> {
        let Some(key) = entry.key() else {
            return Ok(false);
        };
        Ok(self.store.head_object(entry.container(), &directory_key(&key)).await?.is_some())
    }

    async fn prefix_exists(&self, entry: &Entry) -> Result<bool> {
        let prefix = child_prefix(entry);
        match self.store.list_stream(entry.container(), &prefix, true).try_next().await {
            Ok(first) => Ok(first.is_some()),
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Existence for ObjectFind {
    async fn exists(&self, entry: &Entry) -> Result<bool> {
        let Some(key) = entry.key() else {
            return self.store.bucket_exists(entry.container()).await;
        };
        if entry.is_file() {
            return Ok(self.store.head_object(entry.container(), &key).await?.is_some());
        }
        Ok(self.marker_exists(entry).await? || self.prefix_exists(entry).await?)
    }
}

/// Listing, attributes, removal and home location on an object store.
#[derive(Clone)]
pub struct ObjectFeatures {
    store: ObjectHandle,
}

impl ObjectFeatures {
    pub fn new(store: ObjectHandle) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Listing for ObjectFeatures {
    async fn list(&self, directory: &Entry) -> Result<Vec<Entry>> {
        let prefix = child_prefix(directory);
        let items = match self.store.list(directory.container(), &prefix, true).await {
            Ok(items) => items,
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut children: BTreeMap<PathBuf, Entry> = BTreeMap::new();
        for item in items {
            let (rest, kind) = match &item {
                ListItem::Prefix(common) => (&common[prefix.len()..], EntryType::DIRECTORY),
                ListItem::Object(info) if info.key.ends_with(SEPARATOR) => {
                    (&info.key[prefix.len()..], EntryType::DIRECTORY | EntryType::PLACEHOLDER)
                },
                ListItem::Object(info) => (&info.key[prefix.len()..], EntryType::FILE),
            };
            let name = rest.trim_end_matches(SEPARATOR);
            // The directory's own placeholder.
            if name.is_empty() {
                continue;
            }
            let Ok(child) = directory.child(name, kind) else {
                tracing::warn!(bucket = directory.container(), name, "Skipping unrepresentable key");
                continue;
            };
            children.entry(child.path().to_path_buf()).or_insert(child);
        }
        Ok(children.into_values().collect())
    }

    async fn containers(&self) -> Result<Vec<Entry>> {
        self.store.list_buckets().await?.iter().map(Entry::volume).collect()
    }
}

#[async_trait]
impl AttributeFetch for ObjectFeatures {
    async fn attributes(&self, entry: &Entry) -> Result<Attributes> {
        let bucket = entry.container();
        let Some(key) = entry.key() else {
            return match self.store.bucket_exists(bucket).await? {
                true => Ok(Attributes::directory()),
                false => exn::bail!(ErrorKind::NotFound(entry.path().to_path_buf())),
            };
        };
        if entry.is_file() {
            return match self.store.head_object(bucket, &key).await? {
                Some(info) => Ok(Attributes::new(info.size, info.modified)),
                None => exn::bail!(ErrorKind::NotFound(entry.path().to_path_buf())),
            };
        }
        let prefix = directory_key(&key);
        if let Some(marker) = self.store.head_object(bucket, &prefix).await? {
            return Ok(Attributes::new(0, marker.modified));
        }
        match self.store.list_stream(bucket, &prefix, true).try_next().await {
            Ok(Some(_)) => Ok(Attributes::directory()),
            Ok(None) => exn::bail!(ErrorKind::NotFound(entry.path().to_path_buf())),
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => {
                exn::bail!(ErrorKind::NotFound(entry.path().to_path_buf()))
            },
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl RemoveEntry for ObjectFeatures {
    async fn remove(&self, entry: &Entry) -> Result<()> {
        let bucket = entry.container();
        match entry.key() {
            None => self.store.delete_bucket(bucket).await,
            Some(key) if entry.is_directory() => self.store.delete_object(bucket, &directory_key(&key)).await,
            Some(key) => self.store.delete_object(bucket, &key).await,
        }
    }
}

#[async_trait]
impl HomeLocation for ObjectFeatures {
    async fn home(&self, explicit: Option<&str>) -> Result<Entry> {
        match explicit.or(self.store.default_bucket()) {
            Some(bucket) => Entry::volume(bucket),
            None => exn::bail!(ErrorKind::NoDefaultContainer),
        }
    }
}

/// Directory materialisation on an object store.
///
/// A volume becomes a new bucket, verified by name lookup. Any other
/// directory becomes a placeholder object, verified by both the native and
/// the default find: consumers rely on either, so both must agree.
#[derive(Clone)]
pub struct ObjectDirectory {
    store: ObjectHandle,
    native: ObjectFind,
    default: DefaultFind,
}

impl ObjectDirectory {
    pub fn new(store: ObjectHandle, native: ObjectFind, default: DefaultFind) -> Self {
        Self { store, native, default }
    }

    async fn create_volume(&self, entry: &Entry, region: Option<&str>) -> Result<Entry> {
        let bucket = entry.container();
        self.store.create_bucket(bucket, region).await?;
        if !self.store.bucket_exists(bucket).await? {
            tracing::warn!(bucket, "Bucket not visible after creation");
            exn::bail!(ErrorKind::InconsistentDirectoryState(entry.path().to_path_buf()));
        }
        tracing::info!(bucket, region, "Created bucket");
        entry.clone().with_kind(EntryType::DIRECTORY | EntryType::VOLUME)
    }

    async fn create_placeholder(&self, entry: &Entry, key: &str) -> Result<Entry> {
        let marker = directory_key(key);
        self.store.put_object(entry.container(), &marker, &[]).await?;
        let created = entry.clone().with_kind(entry.kind() | EntryType::PLACEHOLDER)?;
        let native = self.native.marker_exists(&created).await?;
        let default = self.default.exists(&created).await?;
        if !(native && default) {
            tracing::warn!(path = %created.path().display(), native, default, "Placeholder verification failed");
            exn::bail!(ErrorKind::InconsistentDirectoryState(created.path().to_path_buf()));
        }
        tracing::info!(bucket = entry.container(), key = %marker, "Created placeholder");
        Ok(created)
    }
}

#[async_trait]
impl DirectoryCreation for ObjectDirectory {
    #[instrument(skip(self, entry), fields(backend = self.store.name(), path = %entry.path().display()))]
    async fn mkdir(&self, entry: &Entry, region: Option<&str>) -> Result<Entry> {
        let key = entry.key();
        // Only volumes live at the top level.
        if !entry.is_directory() || entry.is_volume() != key.is_none() {
            exn::bail!(ErrorKind::InvalidTypeTransition(entry.path().to_path_buf()));
        }
        if self.native.exists(entry).await? {
            exn::bail!(ErrorKind::AlreadyExists(entry.path().to_path_buf()));
        }
        match key {
            None => self.create_volume(entry, region).await,
            Some(key) => self.create_placeholder(entry, &key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockStore, ObjectStore};
    use crate::features::Features;
    use std::path::Path;
    use std::sync::Arc;

    fn setup(store: MockStore) -> (Arc<MockStore>, Features) {
        let store = Arc::new(store);
        let features = Features::object_store(store.clone());
        (store, features)
    }

    #[tokio::test]
    async fn test_native_find() {
        let (_, features) = setup(
            MockStore::default()
                .with_object("bucket", "implied/file.txt", 4, None)
                .with_object("bucket", "marked/", 0, None),
        );
        let find = &features.existence;
        assert!(find.exists(&Entry::volume("bucket").unwrap()).await.unwrap());
        assert!(!find.exists(&Entry::volume("missing").unwrap()).await.unwrap());
        assert!(find.exists(&Entry::directory("bucket/marked").unwrap()).await.unwrap());
        assert!(find.exists(&Entry::directory("bucket/implied").unwrap()).await.unwrap());
        assert!(find.exists(&Entry::file("bucket/implied/file.txt").unwrap()).await.unwrap());
        assert!(!find.exists(&Entry::file("bucket/implied").unwrap()).await.unwrap());
        assert!(!find.exists(&Entry::directory("missing/dir").unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_listing() {
        let (_, features) = setup(
            MockStore::default()
                .with_object("bucket", "dir/", 0, None)
                .with_object("bucket", "dir/a.txt", 1, None)
                .with_object("bucket", "dir/sub/b.txt", 2, None)
                .with_object("bucket", "dir/empty/", 0, None),
        );
        let dir = Entry::directory("bucket/dir").unwrap();
        let children = features.listing.list(&dir).await.unwrap();
        let paths: Vec<_> = children.iter().map(|c| c.path().to_path_buf()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("bucket/dir/a.txt"), PathBuf::from("bucket/dir/empty"), PathBuf::from("bucket/dir/sub")]
        );
        assert!(children[0].is_file());
        assert!(children[1].is_directory());
        assert!(children[2].is_directory());
        let missing = Entry::directory("nope/dir").unwrap();
        assert!(features.listing.list(&missing).await.unwrap().is_empty());
        let containers = features.listing.containers().await.unwrap();
        assert_eq!(containers, vec![Entry::volume("bucket").unwrap()]);
    }

    #[tokio::test]
    async fn test_create_placeholder_under_volume() {
        let (store, features) = setup(MockStore::default().with_bucket("bucket"));
        let volume = Entry::volume("bucket").unwrap();
        let dir = volume.child("abc123", EntryType::DIRECTORY).unwrap();
        let created = features.directories.mkdir(&dir, None).await.unwrap();
        assert!(created.is_placeholder());
        assert!(created.is_directory());
        assert_eq!(store.keys("bucket").await, vec!["abc123/".to_string()]);
        // Both independent checks agree
        assert!(ObjectFind::new(store.clone()).marker_exists(&created).await.unwrap());
        assert!(features.existence.exists(&created).await.unwrap());
        assert!(features.default_find().exists(&created).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_volume() {
        let (store, features) = setup(MockStore::default());
        let created = features.directories.mkdir(&Entry::volume("fresh").unwrap(), Some("eu-west-1")).await.unwrap();
        assert!(created.is_volume());
        assert!(store.bucket_exists("fresh").await.unwrap());
        assert!(features.existence.exists(&created).await.unwrap());
    }

    #[tokio::test]
    async fn test_top_level_directory_is_not_a_volume() {
        let (store, features) = setup(MockStore::default());
        let err = features.directories.mkdir(&Entry::directory("newbucket").unwrap(), None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidTypeTransition(path) if path == Path::new("newbucket")));
        assert!(!store.bucket_exists("newbucket").await.unwrap());
        assert!(store.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_existing() {
        let (store, features) = setup(MockStore::default().with_object("bucket", "dir/file", 1, None));
        let err = features.directories.mkdir(&Entry::directory("bucket/dir").unwrap(), None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(path) if path == Path::new("bucket/dir")));
        let err = features.directories.mkdir(&Entry::volume("bucket").unwrap(), None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        assert_eq!(store.keys("bucket").await, vec!["dir/file".to_string()]);
    }

    #[tokio::test]
    async fn test_lost_placeholder_is_inconsistent() {
        let (_, features) = setup(MockStore::default().with_bucket("bucket").with_lost_writes());
        let err = features.directories.mkdir(&Entry::directory("bucket/ghost").unwrap(), None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InconsistentDirectoryState(_)));
    }

    #[tokio::test]
    async fn test_lost_bucket_is_inconsistent() {
        let (_, features) = setup(MockStore::default().with_lost_writes());
        let err = features.directories.mkdir(&Entry::volume("ghost").unwrap(), None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InconsistentDirectoryState(_)));
    }

    #[tokio::test]
    async fn test_create_failures() {
        let (_, features) = setup(MockStore::default().with_bucket("bucket").with_denied_writes());
        let dir = Entry::directory("bucket/dir").unwrap();
        let err = features.directories.mkdir(&dir, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        assert!(!err.is_retryable());

        let (store, features) = setup(MockStore::default().with_bucket("bucket"));
        store.set_offline(true);
        let err = features.directories.mkdir(&dir, None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BackendUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_attributes() {
        let (_, features) = setup(
            MockStore::default()
                .with_object("bucket", "file.bin", 1_480, None)
                .with_object("bucket", "implied/x", 1, None),
        );
        let file = features.attributes.attributes(&Entry::file("bucket/file.bin").unwrap()).await.unwrap();
        assert_eq!(file.size, 1_480);
        let dir = features.attributes.attributes(&Entry::directory("bucket/implied").unwrap()).await.unwrap();
        assert_eq!(dir, Attributes::directory());
        let err = features.attributes.attributes(&Entry::file("bucket/none").unwrap()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_home() {
        let (_, features) = setup(MockStore::default().with_default_bucket("photos"));
        assert_eq!(features.home.home(None).await.unwrap(), Entry::volume("photos").unwrap());
        assert_eq!(features.home.home(Some("other")).await.unwrap(), Entry::volume("other").unwrap());

        let (_, features) = setup(MockStore::default());
        let err = features.home.home(None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoDefaultContainer));
        assert!(features.home.home(Some("explicit")).await.unwrap().is_volume());
    }
}
