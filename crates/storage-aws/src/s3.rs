//! S3 object store.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use aws_sdk_s3::Client as S3Client;
use dicom_transfer_common::ProgressCallback;
use dicom_transfer_storage::{
    ObjectInfo, ObjectStore, OperationType, StorageError, StorageSettings, TransferProgress,
};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::load_sdk_config;
use crate::error::object_error;

/// `ObjectStore` implementation over the AWS SDK for Rust.
///
/// Every object is written with AES256 server-side encryption.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a store from connection settings.
    ///
    /// # Arguments
    /// * `settings` - Region, optional credentials and optional endpoint
    pub async fn new(settings: &StorageSettings) -> Self {
        let sdk_config: SdkConfig = load_sdk_config(settings).await;
        Self::from_config(&sdk_config, settings.endpoint_url.is_some())
    }

    /// Create a store from a loaded SDK configuration.
    ///
    /// Custom endpoints usually serve buckets by path, not by virtual host.
    pub fn from_config(sdk_config: &SdkConfig, force_path_style: bool) -> Self {
        let config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(force_path_style)
            .build();
        Self {
            client: S3Client::from_conf(config),
        }
    }

    /// Create a store from an existing client (for testing).
    pub fn from_client(client: S3Client) -> Self {
        Self { client }
    }
}

fn report(
    progress: Option<&dyn ProgressCallback<TransferProgress>>,
    operation: OperationType,
    key: &str,
    bytes_transferred: u64,
    total_bytes: Option<u64>,
) {
    if let Some(cb) = progress {
        cb.on_progress(&TransferProgress {
            operation,
            key: key.to_string(),
            bytes_transferred,
            total_bytes,
        });
    }
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> StorageError {
    StorageError::IoError {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Sibling path a download is streamed into before it is renamed into place.
fn partial_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Move a finished download into place, or discard it if streaming failed.
///
/// The destination is never left holding a partial object.
async fn commit_partial(
    partial: &Path,
    path: &Path,
    streamed: Result<u64, StorageError>,
) -> Result<u64, StorageError> {
    match streamed {
        Ok(written) => {
            if let Err(e) = tokio::fs::rename(partial, path).await {
                let _ = tokio::fs::remove_file(partial).await;
                return Err(io_error(path, e));
            }
            Ok(written)
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(partial).await {
                tracing::warn!(path = %partial.display(), error = %cleanup, "partial download not removed");
            }
            Err(e)
        }
    }
}

async fn stream_body(
    mut body: ByteStream,
    file: &mut File,
    partial: &Path,
    key: &str,
    total: Option<u64>,
    progress: Option<&dyn ProgressCallback<TransferProgress>>,
) -> Result<u64, StorageError> {
    let mut written: u64 = 0;
    while let Some(chunk) = body.try_next().await.map_err(|e| StorageError::NetworkError {
        message: e.to_string(),
        retryable: true,
    })? {
        file.write_all(&chunk).await.map_err(|e| io_error(partial, e))?;
        written += chunk.len() as u64;
        report(progress, OperationType::Downloading, key, written, total);
    }
    file.flush().await.map_err(|e| io_error(partial, e))?;
    Ok(written)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<u64>, StorageError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(output.content_length().map(|l| l as u64).unwrap_or(0))),
            Err(err) => match object_error(err, bucket, key) {
                StorageError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<u64, StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .server_side_encryption(ServerSideEncryption::Aes256)
            .body(ByteStream::from(data.to_vec()));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .map_err(|err| object_error(err, bucket, key))?;
        Ok(data.len() as u64)
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<u64, StorageError> {
        let size: u64 = tokio::fs::metadata(path)
            .await
            .map_err(|e| io_error(path, e))?
            .len();
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| io_error(path, e))?;

        report(progress, OperationType::Uploading, key, 0, Some(size));
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .server_side_encryption(ServerSideEncryption::Aes256)
            .content_length(size as i64)
            .body(body)
            .send()
            .await
            .map_err(|err| object_error(err, bucket, key))?;
        report(progress, OperationType::Uploading, key, size, Some(size));

        tracing::debug!(bucket = %bucket, key = %key, bytes = size, "object stored");
        Ok(size)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| object_error(err, bucket, key))?;

        let data: Vec<u8> = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::NetworkError {
                message: e.to_string(),
                retryable: true,
            })?
            .into_bytes()
            .to_vec();
        Ok(data)
    }

    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<u64, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| object_error(err, bucket, key))?;
        let total: Option<u64> = response.content_length().map(|l| l as u64);

        let partial: PathBuf = partial_path(path);
        let mut file: File = File::create(&partial).await.map_err(|e| io_error(&partial, e))?;
        let streamed: Result<u64, StorageError> =
            stream_body(response.body, &mut file, &partial, key, total, progress).await;
        drop(file);
        let written: u64 = commit_partial(&partial, path, streamed).await?;

        tracing::debug!(bucket = %bucket, key = %key, bytes = written, "object fetched");
        Ok(written)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| object_error(err, bucket, key))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects: Vec<ObjectInfo> = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(ref token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|err| object_error(err, bucket, prefix))?;

            for obj in response.contents() {
                let last_modified: Option<i64> = obj
                    .last_modified()
                    .and_then(|dt| dt.to_millis().ok())
                    .map(|ms| ms / 1000);

                objects.push(ObjectInfo {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().map(|s| s as u64).unwrap_or(0),
                    last_modified,
                    etag: obj.e_tag().map(|s| s.to_string()),
                });
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(objects)
    }
}
