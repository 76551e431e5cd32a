use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    #[error("Object store I/O error: {0}")]
    Io(String),
}

/// Bucket/key object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError>;

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<(), ObjectStoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError>;
}

/// Object store backed by a directory tree: `<root>/<bucket>/<key>`
///
/// Writes go to a temporary sibling and are renamed into place, so readers
/// never observe a partially written object.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let relative = Path::new(part);
            let is_plain = !part.is_empty()
                && relative
                    .components()
                    .all(|component| matches!(component, Component::Normal(_)));
            if !is_plain {
                return Err(ObjectStoreError::InvalidKey(format!("{bucket}/{key}")));
            }
            path.push(relative);
        }
        Ok(path)
    }

    fn map_io(error: std::io::Error, bucket: &str, key: &str) -> ObjectStoreError {
        if error.kind() == ErrorKind::NotFound {
            ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        } else {
            ObjectStoreError::Io(format!("{bucket}/{key}: {error}"))
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Self::map_io(e, bucket, key))
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io(e, bucket, key))?;
        }

        let staging = path.with_extension(format!("{}.partial", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&staging, &body)
            .await
            .map_err(|e| Self::map_io(e, bucket, key))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|e| Self::map_io(e, bucket, key))?;

        debug!(bucket = %bucket, key = %key, bytes = body.len(), "Object written");
        Ok(())
    }

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<(), ObjectStoreError> {
        let body = self.get(source_bucket, source_key).await?;
        self.put(destination_bucket, destination_key, body).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Self::map_io(e, bucket, key))
    }
}
