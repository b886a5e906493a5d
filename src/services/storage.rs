use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::config::R2Config;

/// Public URL prefix under which the local upload directory is served.
pub const LOCAL_PUBLIC_PREFIX: &str = "/uploads";

/// Where poem images live. References returned by `put` go straight into
/// `PoetryRecord::images`.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String, StorageError>;

    async fn delete(&self, reference: &str) -> Result<(), StorageError>;
}

/// Key for a user upload: `YYYY/MM/<uuid>.<ext>`.
pub fn upload_key(now: DateTime<Utc>, extension: &str) -> String {
    format!("{}/{}.{}", now.format("%Y/%m"), Uuid::new_v4(), extension)
}

/// Key for generated artwork: `ai-generated/YYYY/MM/<uuid>.<ext>`.
pub fn generated_image_key(now: DateTime<Utc>, extension: &str) -> String {
    format!("ai-generated/{}", upload_key(now, extension))
}

fn checked_relative(key: &str) -> Result<&Path, StorageError> {
    let path = Path::new(key);
    let safe = path
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if key.is_empty() || !safe {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(path)
}

/// Images on the local filesystem, served by the HTTP layer at `/uploads`.
pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<String, StorageError> {
        let path = self.root.join(checked_relative(key)?);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(format!("{LOCAL_PUBLIC_PREFIX}/{key}"))
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        let key = reference
            .strip_prefix(LOCAL_PUBLIC_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StorageError::ForeignReference(reference.to_string()))?;
        let path = self.root.join(checked_relative(key)?);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2ImageStore {
    bucket: Box<Bucket>,
    public_url: String,
}

impl R2ImageStore {
    pub fn new(config: &R2Config) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: config.endpoint.clone(),
        };

        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(config.secret_key.expose()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ImageStore for R2ImageStore {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String, StorageError> {
        checked_relative(key)?;
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(format!("{}/{}", self.public_url, key))
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        let key = reference
            .strip_prefix(&self.public_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StorageError::ForeignReference(reference.to_string()))?;
        self.bucket.delete_object(key).await.map_err(StorageError::S3)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("invalid object key {0:?}")]
    InvalidKey(String),

    #[error("reference {0:?} does not belong to this store")]
    ForeignReference(String),
}
