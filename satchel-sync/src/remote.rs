//! Remote object store — S3-compatible, retried, path-style addressed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use satchel_core::{Config, RemoteSnapshot, SyncKey, Transfer};

use crate::error::{io_err, operation_err, SyncError};
use crate::retry::{with_retry, RetryPolicy};

/// The remote side of the mirror, as the engine sees it.
///
/// [`RemoteStore`] is the production implementation; the daemon's tests
/// drive the engine against an in-memory one instead.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the file at `path`, put it under its key, return the
    /// store-assigned ETag.
    async fn upload(&self, path: &Path) -> Result<Transfer, SyncError>;

    /// Fetch the object for `path`'s key into the local file, creating or
    /// overwriting it. `etag` is the listing's value, carried through for
    /// bookkeeping only — it is not re-verified against the store.
    async fn download(&self, path: &Path, etag: &str) -> Result<Transfer, SyncError>;

    /// Remove the object for `path`'s key.
    async fn delete(&self, path: &Path) -> Result<SyncKey, SyncError>;

    /// List the whole bucket: key → ETag, fully paginated.
    async fn list(&self) -> Result<RemoteSnapshot, SyncError>;
}

/// S3 client plus the watched root it normalizes keys against.
///
/// Stateless apart from credentials and endpoint; safe to call
/// concurrently for distinct keys. Upload/download/delete run under the
/// bounded retry policy; listing does not — a listing failure is fatal to
/// its reconciliation pass, not worth papering over.
pub struct RemoteStore {
    client: Client,
    bucket: String,
    root: PathBuf,
    retry: RetryPolicy,
}

impl RemoteStore {
    pub fn new(config: &Config) -> RemoteStore {
        let credentials = Credentials::new(
            config.secret.clone(),
            config.token.clone(),
            None,
            None,
            "satchel-config",
        );
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint.clone())
            .region(Region::new(config.region.clone()))
            .force_path_style(true)
            .build();

        RemoteStore {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            root: config.root.clone(),
            retry: RetryPolicy::default(),
        }
    }

    fn key_for(&self, path: &Path) -> Result<SyncKey, SyncError> {
        SyncKey::from_path(&self.root, path)
            .ok_or_else(|| SyncError::InvalidPath(path.to_path_buf()))
    }
}

#[async_trait]
impl ObjectStore for RemoteStore {
    async fn upload(&self, path: &Path) -> Result<Transfer, SyncError> {
        let key = self.key_for(path)?;
        let body = tokio::fs::read(path).await.map_err(|e| io_err(path, e))?;

        let etag = with_retry(&self.retry, "upload", || {
            let request = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key.as_str())
                .body(ByteStream::from(body.clone()));
            async move {
                let response = request.send().await.map_err(|e| e.to_string())?;
                response
                    .e_tag()
                    .map(String::from)
                    .ok_or_else(|| "store returned no etag".to_string())
            }
        })
        .await
        .map_err(|message| operation_err("upload", &key, self.retry.max_attempts, message))?;

        Ok(Transfer { key, etag })
    }

    async fn download(&self, path: &Path, etag: &str) -> Result<Transfer, SyncError> {
        let key = self.key_for(path)?;

        let bytes = with_retry(&self.retry, "download", || {
            let request = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key.as_str());
            async move {
                let response = request.send().await.map_err(|e| e.to_string())?;
                let data = response.body.collect().await.map_err(|e| e.to_string())?;
                Ok::<_, String>(data.into_bytes())
            }
        })
        .await
        .map_err(|message| operation_err("download", &key, self.retry.max_attempts, message))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| io_err(path, e))?;

        Ok(Transfer {
            key,
            etag: etag.to_string(),
        })
    }

    async fn delete(&self, path: &Path) -> Result<SyncKey, SyncError> {
        let key = self.key_for(path)?;

        with_retry(&self.retry, "delete", || {
            let request = self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(key.as_str());
            async move { request.send().await.map(|_| ()).map_err(|e| e.to_string()) }
        })
        .await
        .map_err(|message| operation_err("delete", &key, self.retry.max_attempts, message))?;

        Ok(key)
    }

    async fn list(&self) -> Result<RemoteSnapshot, SyncError> {
        let mut snapshot = RemoteSnapshot::new();
        let mut continuation: Option<String> = None;

        // A single ListObjectsV2 page caps out at 1000 keys; follow the
        // continuation token until the listing is exhausted.
        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = &continuation {
                request = request.continuation_token(token.clone());
            }
            let response = request
                .send()
                .await
                .map_err(|e| SyncError::List(e.to_string()))?;

            for object in response.contents() {
                let (Some(key), Some(etag)) = (object.key(), object.e_tag()) else {
                    continue;
                };
                snapshot.insert(SyncKey::from(key), etag.to_string());
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(snapshot)
    }
}
