use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use axum::body::Bytes;
use s3::{
    operation::{create_bucket::CreateBucketError, get_object::GetObjectError},
    primitives::ByteStream,
};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

// 1. StorageService Contract
/// StorageService
///
/// Abstract contract for the file storage collaborator. Handlers and the
/// workflow only see this trait, so the disk, S3 and in-memory implementations
/// are interchangeable.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Prepares the backend (creates the upload directory or bucket). Idempotent.
    async fn ensure_ready(&self) -> Result<(), StorageError>;

    /// Writes an object. On failure nothing is left behind under `key`.
    async fn put_object(&self, key: &str, content_type: &str, data: Bytes)
    -> Result<(), StorageError>;

    /// Reads an object back. `Ok(None)` when the key does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StorageError>;

    /// Removes an object. Removing a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;

/// Builds the storage collaborator selected by configuration.
pub async fn from_config(config: &StorageConfig) -> StorageState {
    match config {
        StorageConfig::Disk { upload_dir } => Arc::new(LocalFileStorage::new(upload_dir.clone())),
        StorageConfig::S3 {
            endpoint,
            region,
            access_key,
            secret_key,
            bucket,
        } => Arc::new(S3StorageClient::new(endpoint, region, access_key, secret_key, bucket).await),
    }
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`) and empty segments
/// from a key so it can never escape the storage root.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 2. Local disk implementation
/// LocalFileStorage
///
/// Stores objects as files below `root`, one directory level per key segment.
#[derive(Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let key = sanitize_key(key);
        if key.is_empty() {
            return Err(StorageError::Backend("empty storage key".to_string()));
        }
        Ok(self.root.join(key))
    }

    async fn write_file(path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl StorageService for LocalFileStorage {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        _content_type: &str,
        data: Bytes,
    ) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Err(e) = Self::write_file(&path, &data).await {
            // A half-written file must not survive a failed upload.
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// 3. The S3 implementation (MinIO locally)
/// S3StorageClient
///
/// Concrete implementation on the AWS SDK. `force_path_style(true)` keeps it
/// compatible with MinIO and other S3-compatible gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// Creates the bucket. An existing bucket is fine; anything else, including
    /// an unreachable endpoint or bad credentials, is an error.
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        let result = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => match err.into_service_error() {
                CreateBucketError::BucketAlreadyOwnedByYou(_)
                | CreateBucketError::BucketAlreadyExists(_) => Ok(()),
                other => Err(StorageError::Backend(format!(
                    "bucket {} is not usable: {}",
                    self.bucket_name, other
                ))),
            },
        }
    }

    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .send()
            .await;

        let output = match response {
            Ok(output) => output,
            Err(err) => {
                return match err.into_service_error() {
                    GetObjectError::NoSuchKey(_) => Ok(None),
                    other => Err(StorageError::Backend(other.to_string())),
                };
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Some(data.into_bytes()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

// 4. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory storage for tests. `should_fail` makes every write fail, which is
/// how tests exercise the cleanup paths.
#[derive(Clone, Default)]
pub struct MockStorageService {
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, (String, Bytes)>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Keys currently held, sorted.
    pub fn keys(&self) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Content type recorded for `key`, if present.
    pub fn content_type(&self, key: &str) -> Option<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.get(&sanitize_key(key)).map(|(ct, _)| ct.clone())
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(sanitize_key(key), (content_type.to_string(), data));
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        Ok(objects.get(&sanitize_key(key)).map(|(_, data)| data.clone()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.remove(&sanitize_key(key));
        Ok(())
    }
}
