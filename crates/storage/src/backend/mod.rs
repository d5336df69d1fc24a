//! Backend sessions.
//!
//! This module defines the [`ObjectStore`] trait: the narrow set of calls an
//! object store session (S3-compatible services, or the in-memory mock)
//! exposes to the [feature set](crate::features). Backends with native
//! directories are represented by [`LocalBackend`] instead.
//!
//! Sessions are constructed by the caller (credentials, endpoints, retry
//! policy) and shared by reference; nothing in this crate mutates
//! session-level state.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;
use crate::error::Result;
use crate::models::{ListItem, ObjectInfo};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub(crate) type ListStream<'a> = Pin<Box<dyn Stream<Item = Result<ListItem>> + Send + 'a>>;

/// Unified interface for object store sessions.
///
/// An object store has a flat namespace of buckets, each holding objects
/// addressed by key. There are no directories: a "directory" is either
/// implied by keys sharing a prefix, or materialised as a zero-length
/// placeholder object whose key ends with [`SEPARATOR`](crate::path::SEPARATOR).
///
/// # Examples
///
/// ```
/// use duet_storage::backend::ObjectStore;
/// use duet_storage::error::Result;
///
/// async fn is_empty_bucket(store: &dyn ObjectStore, bucket: &str) -> Result<bool> {
///     Ok(store.list(bucket, "", false).await?.is_empty())
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Bucket to use when the caller does not name one explicitly.
    fn default_bucket(&self) -> Option<&str>;

    /// Check whether a bucket exists, by name only.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Names of all buckets visible to the session.
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Create a new bucket, optionally constrained to a region.
    ///
    /// Returns [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists) if
    /// the bucket name is taken.
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> Result<()>;

    /// Delete an (empty) bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Metadata of the object with exactly this key, `None` if absent.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>>;

    /// Create or overwrite an object.
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()>;

    /// Delete an object. Deleting a missing key succeeds, as on S3.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Stream objects whose key starts with `prefix`.
    ///
    /// With `delimited` set, keys containing a further separator after the
    /// prefix are rolled up into [`ListItem::Prefix`] entries, one per
    /// distinct "subdirectory", exactly like S3's `delimiter=/`.
    fn list_stream<'a>(&'a self, bucket: &'a str, prefix: &'a str, delimited: bool) -> ListStream<'a>;

    /// Collect [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, bucket: &str, prefix: &str, delimited: bool) -> Result<Vec<ListItem>> {
        self.list_stream(bucket, prefix, delimited).try_collect().await
    }
}
