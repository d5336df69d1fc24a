//! S3-compatible object store session.
//!
//! This module provides an [`ObjectStore`] implementation for S3-compatible
//! services including AWS S3, Google Cloud Storage (interoperability mode),
//! Backblaze B2, Tigris (Fly.io) and MinIO.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file. Each
//! remote specifies its own `key_id` and `key_secret`.

use crate::backend::{ListStream, ObjectStore};
use crate::error::{Error, ErrorKind, Result};
use crate::models::{ListItem, ObjectInfo};
use crate::path::SEPARATOR;
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig},
    error::{ProvideErrorMetadata, SdkError},
    primitives::{ByteStream, DateTime},
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use exn::ResultExt;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::instrument;

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;
/// Region that must not be sent as a location constraint.
const US_EAST_1: &str = "us-east-1";

/// S3-compatible object store session.
///
/// # Examples
///
/// ```no_run
/// use duet_storage::backend::S3Store;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = S3Store::new(
///     "b2",
///     Some("photos".to_string()),
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Store {
    name: String,
    client: Client,
    default_bucket: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Store {
    /// Create a new S3 session.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `default_bucket` - Bucket used as home when none is given explicitly
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub async fn new(
        name: impl Into<String>,
        default_bucket: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "duet-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Exponential backoff: 1 initial attempt + 3 retries
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Ok(Self::from_client(name, Client::from_conf(config_builder.build()), default_bucket))
    }

    /// Wrap an already configured client.
    pub fn from_client(name: impl Into<String>, client: Client, default_bucket: Option<String>) -> Self {
        Self {
            name: name.into(),
            client,
            default_bucket,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        }
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    /// Convert AWS DateTime to OffsetDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    fn object_info(key: &str, size: Option<i64>, modified: Option<&DateTime>) -> Result<ObjectInfo> {
        let modified = modified.map(Self::parse_datetime).transpose()?;
        Ok(ObjectInfo::new(key, size.and_then(|s| u64::try_from(s).ok()).unwrap_or(0), modified))
    }
}

/// Classify an SDK failure into an actionable [`ErrorKind`], keeping the SDK
/// error as the child frame of the error tree.
fn sdk_error<E>(err: SdkError<E, HttpResponse>, target: impl Into<PathBuf>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let target = target.into();
    let status = err.raw_response().map(|response| response.status().as_u16());
    let kind = match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
            ErrorKind::BackendUnavailable(err.to_string())
        },
        _ => match (err.code(), status) {
            (Some("AccessDenied" | "AllAccessDisabled" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"), _)
            | (_, Some(401 | 403)) => ErrorKind::PermissionDenied(target),
            (Some("BucketAlreadyExists" | "BucketAlreadyOwnedByYou"), _) | (_, Some(409)) => {
                ErrorKind::AlreadyExists(target)
            },
            (Some("NoSuchBucket" | "NoSuchKey" | "NotFound"), _) | (_, Some(404)) => ErrorKind::NotFound(target),
            (Some("SlowDown" | "ServiceUnavailable" | "InternalError"), _) | (_, Some(500..=599)) => {
                ErrorKind::BackendUnavailable(err.to_string())
            },
            _ => ErrorKind::BackendError(err.to_string()),
        },
    };
    exn::Exn::from(err).raise(kind)
}

fn object_path(bucket: &str, key: &str) -> PathBuf {
    PathBuf::from(bucket).join(key)
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_bucket(&self) -> Option<&str> {
        self.default_bucket.as_deref()
    }

    #[instrument(skip(self), fields(backend = %self.name))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let _permit = self.acquire_permit().await?;
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(sdk_error(err, bucket)),
        }
    }

    #[instrument(skip(self), fields(backend = %self.name))]
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let _permit = self.acquire_permit().await?;
        let output = self.client.list_buckets().send().await.map_err(|err| sdk_error(err, ""))?;
        Ok(output.buckets().iter().filter_map(|b| b.name()).map(str::to_string).collect())
    }

    #[instrument(skip(self), fields(backend = %self.name))]
    async fn create_bucket(&self, bucket: &str, region: Option<&str>) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        let mut request = self.client.create_bucket().bucket(bucket);
        // S3 rejects an explicit constraint for its default region.
        if let Some(region) = region.filter(|r| *r != US_EAST_1) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder().location_constraint(BucketLocationConstraint::from(region)).build(),
            );
        }
        request.send().await.map_err(|err| sdk_error(err, bucket))?;
        tracing::info!(bucket, region, "Created bucket");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = %self.name))]
    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        self.client.delete_bucket().bucket(bucket).send().await.map_err(|err| sdk_error(err, bucket))?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectInfo>> {
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(Self::object_info(key, output.content_length(), output.last_modified())?)),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => Err(sdk_error(err, object_path(bucket, key))),
        }
    }

    #[instrument(skip(self, data), fields(backend = %self.name, bytes = data.len()))]
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|err| sdk_error(err, object_path(bucket, key)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = %self.name))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| sdk_error(err, object_path(bucket, key)))?;
        Ok(())
    }

    fn list_stream<'a>(&'a self, bucket: &'a str, prefix: &'a str, delimited: bool) -> ListStream<'a> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_delimiter(delimited.then(|| SEPARATOR.to_string()))
            .into_paginator()
            .send();
        Box::pin(stream! {
            loop {
                let page = {
                    let _permit = match self.acquire_permit().await {
                        Ok(permit) => permit,
                        Err(e) => { yield Err(e); return; },
                    };
                    pages.next().await
                };
                let output = match page {
                    None => break,
                    Some(Ok(output)) => output,
                    Some(Err(err)) => { yield Err(sdk_error(err, bucket)); return; },
                };
                for common in output.common_prefixes() {
                    if let Some(p) = common.prefix() {
                        yield Ok(ListItem::Prefix(p.to_string()));
                    }
                }
                for object in output.contents() {
                    let Some(key) = object.key() else { continue };
                    yield Self::object_info(key, object.size(), object.last_modified()).map(ListItem::Object);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::operation::head_bucket::{HeadBucketError, HeadBucketOutput};
    use aws_sdk_s3::operation::head_object::{HeadObjectError, HeadObjectOutput};
    use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
    use aws_sdk_s3::types::error::NotFound;
    use aws_sdk_s3::types::{CommonPrefix, Object};
    use aws_smithy_mocks::{RuleMode, mock, mock_client};

    fn store(client: Client) -> S3Store {
        S3Store::from_client("test", client, Some("bucket".to_string()))
    }

    #[tokio::test]
    async fn test_head_object_found() {
        let rule = mock!(Client::head_object)
            .match_requests(|req| req.bucket() == Some("bucket") && req.key() == Some("a/b"))
            .then_output(|| {
                HeadObjectOutput::builder()
                    .content_length(393_495_974)
                    .last_modified(DateTime::from_secs(1_700_000_000))
                    .build()
            });
        let store = store(mock_client!(aws_sdk_s3, [&rule]));
        let info = store.head_object("bucket", "a/b").await.unwrap().unwrap();
        assert_eq!(info.size, 393_495_974);
        assert_eq!(info.modified.map(|m| m.unix_timestamp()), Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_head_object_missing() {
        let rule = mock!(Client::head_object)
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let store = store(mock_client!(aws_sdk_s3, [&rule]));
        assert!(store.head_object("bucket", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bucket_exists() {
        let found = mock!(Client::head_bucket)
            .match_requests(|req| req.bucket() == Some("present"))
            .then_output(|| HeadBucketOutput::builder().build());
        let missing = mock!(Client::head_bucket)
            .match_requests(|req| req.bucket() == Some("absent"))
            .then_error(|| HeadBucketError::NotFound(NotFound::builder().build()));
        let store = store(mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&found, &missing]));
        assert!(store.bucket_exists("present").await.unwrap());
        assert!(!store.bucket_exists("absent").await.unwrap());
    }

    #[tokio::test]
    async fn test_delimited_listing() {
        let rule = mock!(Client::list_objects_v2)
            .match_requests(|req| req.prefix() == Some("a/") && req.delimiter() == Some("/"))
            .then_output(|| {
                ListObjectsV2Output::builder()
                    .common_prefixes(CommonPrefix::builder().prefix("a/sub/").build())
                    .contents(Object::builder().key("a/file.txt").size(12).build())
                    .build()
            });
        let store = store(mock_client!(aws_sdk_s3, [&rule]));
        let items = store.list("bucket", "a/", true).await.unwrap();
        assert_eq!(
            items,
            vec![
                ListItem::Prefix("a/sub/".to_string()),
                ListItem::Object(ObjectInfo::new("a/file.txt", 12, None)),
            ]
        );
    }

    #[test]
    fn test_parse_datetime() {
        let parsed = S3Store::parse_datetime(&DateTime::from_secs(86_400)).unwrap();
        assert_eq!(parsed.unix_timestamp(), 86_400);
    }
}
