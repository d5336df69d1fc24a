//! In-memory object store for testing.

use super::ListStream;
use crate::backend::ObjectStore;
use crate::error::{ErrorKind, Result};
use crate::models::{ListItem, ObjectInfo};
use crate::path::SEPARATOR;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

type Buckets = BTreeMap<String, BTreeMap<String, ObjectInfo>>;

/// In-memory object store for testing.
///
/// Only metadata is kept (key, size, timestamp), so tests can describe
/// arbitrarily large objects for free. Buckets live in a [`BTreeMap`] behind
/// a [`RwLock`], so all trait methods can operate on `&self`.
///
/// A few switches simulate misbehaving backends:
/// - [`set_offline`](Self::set_offline): every call fails with
///   [`BackendUnavailable`](ErrorKind::BackendUnavailable).
/// - [`with_denied_writes`](Self::with_denied_writes): mutating calls fail with
///   [`PermissionDenied`](ErrorKind::PermissionDenied).
/// - [`with_lost_writes`](Self::with_lost_writes): writes are acknowledged but
///   never become visible.
/// - [`with_failing_delete`](Self::with_failing_delete): deleting one key fails.
///
/// # Examples
///
/// ```
/// use duet_storage::backend::{MockStore, ObjectStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::default()
///     .with_bucket("photos")
///     .with_object("photos", "2024/beach.jpg", 2_048, None);
/// assert!(store.head_object("photos", "2024/beach.jpg").await?.is_some());
/// # Ok(())
/// # }
/// ```
pub struct MockStore {
    name: String,
    default_bucket: Option<String>,
    buckets: RwLock<Buckets>,
    offline: AtomicBool,
    deny_writes: bool,
    lose_writes: bool,
    failing_deletes: HashSet<(String, String)>,
    calls: AtomicUsize,
}

impl MockStore {
    /// Change the name of the mock store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the bucket reported as the session's default container.
    pub fn with_default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = Some(bucket.into());
        self
    }

    /// Add an empty bucket.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.buckets.get_mut().entry(bucket.into()).or_default();
        self
    }

    /// Add an object (creating its bucket if needed).
    pub fn with_object(
        mut self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        size: u64,
        modified: impl Into<Option<OffsetDateTime>>,
    ) -> Self {
        let key = key.into();
        self.buckets
            .get_mut()
            .entry(bucket.into())
            .or_default()
            .insert(key.clone(), ObjectInfo::new(key, size, modified));
        self
    }

    pub fn with_denied_writes(mut self) -> Self {
        self.deny_writes = true;
        self
    }

    pub fn with_lost_writes(mut self) -> Self {
        self.lose_writes = true;
        self
    }

    /// Make deleting `bucket`/`key` fail with a backend error.
    pub fn with_failing_delete(mut self, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        self.failing_deletes.insert((bucket.into(), key.into()));
        self
    }

    /// Simulate a transport outage (or recovery from one).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of trait calls made against this store so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of all keys in a bucket.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets.read().await.get(bucket).map(|objects| objects.keys().cloned().collect()).unwrap_or_default()
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::BackendUnavailable("mock store offline".to_string()));
        }
        Ok(())
    }

    fn enter_write(&self, target: impl Into<PathBuf>) -> Result<()> {
        self.enter()?;
        if self.deny_writes {
            exn::bail!(ErrorKind::PermissionDenied(target.into()));
        }
        Ok(())
    }
}
impl Default for MockStore {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            default_bucket: None,
            buckets: RwLock::new(BTreeMap::new()),
            offline: AtomicBool::new(false),
            deny_writes: false,
            lose_writes: false,
            failing_deletes: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_bucket(&self) -> Option<&str> {
        self.default_bucket.as_deref()
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.enter()?;
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        self.enter()?;
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn create_bucket(&self, bucket: &str, _region: Option<&str>) -> Result<()> {
        self.enter_write(bucket)?;
        let mut guard = self.buckets.write().await;
        if guard.contains_key(bucket) {
            exn::bail!(ErrorKind::AlreadyExists(PathBuf::from(bucket)));
        }
        if !self.lose_writes {
            guard.insert(bucket.to_string(), BTreeMap::new());
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.enter_write(bucket)?;
        let mut guard = self.buckets.write().await;
        let empty = match guard.get(bucket) {
            Some(objects) => objects.is_empty(),
            None => exn::bail!(ErrorKind::NotFound(PathBuf::from(bucket))),
        };
        if !empty {
            exn::bail!(ErrorKind::BackendError(format!("bucket not empty: {bucket}")));
        }
        guard.remove(bucket);
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        self.enter()?;
        Ok(self.buckets.read().await.get(bucket).and_then(|objects| objects.get(key)).cloned())
    }

    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        self.enter_write(PathBuf::from(bucket).join(key))?;
        let mut guard = self.buckets.write().await;
        let Some(objects) = guard.get_mut(bucket) else {
            exn::bail!(ErrorKind::NotFound(PathBuf::from(bucket)));
        };
        if !self.lose_writes {
            let info = ObjectInfo::new(key, data.len() as u64, OffsetDateTime::now_utc());
            objects.insert(key.to_string(), info);
        }
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.enter_write(PathBuf::from(bucket).join(key))?;
        if self.failing_deletes.contains(&(bucket.to_string(), key.to_string())) {
            exn::bail!(ErrorKind::BackendError(format!("refusing to delete {bucket}/{key}")));
        }
        let mut guard = self.buckets.write().await;
        let Some(objects) = guard.get_mut(bucket) else {
            exn::bail!(ErrorKind::NotFound(PathBuf::from(bucket)));
        };
        objects.remove(key);
        Ok(())
    }

    fn list_stream<'a>(&'a self, bucket: &'a str, prefix: &'a str, delimited: bool) -> ListStream<'a> {
        Box::pin(stream! {
            if let Err(e) = self.enter() {
                yield Err(e);
                return;
            }
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let snapshot: Option<Vec<ListItem>> = {
                let guard = self.buckets.read().await;
                guard.get(bucket).map(|objects| {
                    let mut prefixes = BTreeSet::new();
                    let mut items = Vec::new();
                    let matching = objects.range(prefix.to_string()..).take_while(|(key, _)| key.starts_with(prefix));
                    for (key, info) in matching {
                        let rest = &key[prefix.len()..];
                        match rest.find(SEPARATOR).filter(|_| delimited) {
                            Some(index) => {
                                let common = format!("{prefix}{}", &rest[..=index]);
                                if prefixes.insert(common.clone()) {
                                    items.push(ListItem::Prefix(common));
                                }
                            },
                            None => items.push(ListItem::Object(info.clone())),
                        }
                    }
                    items
                })
            };
            let Some(items) = snapshot else {
                yield Err(exn::Exn::from(ErrorKind::NotFound(PathBuf::from(bucket))));
                return;
            };
            for item in items {
                yield Ok(item);
            }
        })
    }
}
