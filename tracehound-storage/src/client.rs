//! Minimal object-store client contract and local bindings
//!
//! The adapter only needs four operations; anything S3-shaped satisfies
//! them. A memory client backs tests, and a sled client gives durable
//! single-node retention.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors surfaced by object-store clients
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Bucket unavailable: {0}")]
    BucketUnavailable(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// The four operations cold storage depends on
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), ObjectStoreError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError>;

    async fn head_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError>;
}

/// In-memory client for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryObjectClient {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), ObjectStoreError> {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| ObjectStoreError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn head_bucket(&self, _bucket: &str) -> Result<(), ObjectStoreError> {
        Ok(())
    }
}

/// Durable single-node client; each bucket maps to a sled tree
#[derive(Debug)]
pub struct SledObjectClient {
    db: sled::Db,
}

impl SledObjectClient {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, ObjectStoreError> {
        let db = sled::open(path).map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    fn tree(&self, bucket: &str) -> Result<sled::Tree, ObjectStoreError> {
        self.db
            .open_tree(bucket)
            .map_err(|e| ObjectStoreError::BucketUnavailable(format!("{}: {}", bucket, e)))
    }
}

#[async_trait]
impl ObjectStoreClient for SledObjectClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), ObjectStoreError> {
        let tree = self.tree(bucket)?;
        tree.insert(key.as_bytes(), body)
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        tree.flush_async()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        debug!(bucket, key, "object stored");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.tree(bucket)?
            .get(key.as_bytes())
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?
            .map(|ivec| ivec.to_vec())
            .ok_or_else(|| ObjectStoreError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        self.tree(bucket)?
            .remove(key.as_bytes())
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?
            .map(|_| ())
            .ok_or_else(|| ObjectStoreError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn head_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        self.tree(bucket).map(|_| ())
    }
}
