//! Cold storage adapter
//!
//! Write-optimized, read-capable retention of encoded evidence. Writes
//! pack the envelope and put the object at `<prefix><id>.thcs`; reads get
//! and unpack. The adapter never panics and captures every client failure
//! into its own error domain; callers must still `verify` a read payload
//! before decoding it.

use crate::client::{ObjectStoreClient, ObjectStoreError};
use std::sync::Arc;
use thiserror::Error;
use tracehound_core::{envelope, EncodedPayload};
use tracing::{debug, warn};

/// Object key suffix for envelope files
pub const ENVELOPE_EXTENSION: &str = ".thcs";

/// Errors from cold storage operations; all retryable at the caller's
/// discretion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColdStorageError {
    #[error("Cold storage write failed: {0}")]
    WriteFailed(String),
    #[error("Cold storage read failed: {0}")]
    ReadFailed(String),
    #[error("Cold storage object not found: {0}")]
    NotFound(String),
    #[error("Cold storage unavailable: {0}")]
    Unavailable(String),
}

impl ColdStorageError {
    pub fn code(&self) -> &'static str {
        match self {
            ColdStorageError::WriteFailed(_) => "COLD_WRITE_FAILED",
            ColdStorageError::ReadFailed(_) => "COLD_READ_FAILED",
            ColdStorageError::NotFound(_) => "COLD_NOT_FOUND",
            ColdStorageError::Unavailable(_) => "COLD_UNAVAILABLE",
        }
    }

    pub fn recoverable(&self) -> bool {
        true
    }
}

/// Adapter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColdStorageConfig {
    pub bucket: String,
    /// Key prefix for every stored object
    pub prefix: String,
    pub content_type: String,
}

impl Default for ColdStorageConfig {
    fn default() -> Self {
        Self {
            bucket: "tracehound-evidence".to_string(),
            prefix: "evidence/".to_string(),
            content_type: "application/octet-stream".to_string(),
        }
    }
}

/// Object-store binding for forensic retention
pub struct ColdStorageAdapter {
    client: Arc<dyn ObjectStoreClient>,
    config: ColdStorageConfig,
}

impl std::fmt::Debug for ColdStorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColdStorageAdapter")
            .field("config", &self.config)
            .finish()
    }
}

impl ColdStorageAdapter {
    pub fn new(client: Arc<dyn ObjectStoreClient>, config: ColdStorageConfig) -> Self {
        Self { client, config }
    }

    /// Object key for an evidence id
    pub fn object_key(&self, id: &str) -> String {
        format!("{}{}{}", self.config.prefix, id, ENVELOPE_EXTENSION)
    }

    /// Pack and persist an encoded payload; overwrites are last-write-wins
    pub async fn write(&self, id: &str, payload: &EncodedPayload) -> Result<String, ColdStorageError> {
        let key = self.object_key(id);
        let body = envelope::pack(payload);
        self.client
            .put_object(&self.config.bucket, &key, body, Some(&self.config.content_type))
            .await
            .map_err(|e| ColdStorageError::WriteFailed(format!("{}: {}", key, e)))?;
        debug!(%key, bytes = payload.compressed_size, "evidence archived");
        Ok(id.to_string())
    }

    /// Fetch and unpack an envelope; the caller verifies before decoding
    pub async fn read(&self, id: &str) -> Result<EncodedPayload, ColdStorageError> {
        let key = self.object_key(id);
        let body = self
            .client
            .get_object(&self.config.bucket, &key)
            .await
            .map_err(|e| match e {
                ObjectStoreError::NotFound(_) => ColdStorageError::NotFound(key.clone()),
                other => ColdStorageError::ReadFailed(format!("{}: {}", key, other)),
            })?;
        envelope::unpack(&body)
            .ok_or_else(|| ColdStorageError::ReadFailed(format!("{}: envelope rejected", key)))
    }

    /// Delete an object; `false` when it was absent or the backend failed
    pub async fn delete(&self, id: &str) -> bool {
        let key = self.object_key(id);
        match self.client.delete_object(&self.config.bucket, &key).await {
            Ok(()) => true,
            Err(ObjectStoreError::NotFound(_)) => false,
            Err(err) => {
                warn!(%key, %err, "cold storage delete failed");
                false
            }
        }
    }

    /// Whether the backing bucket answers
    pub async fn is_available(&self) -> bool {
        match self.client.head_bucket(&self.config.bucket).await {
            Ok(()) => true,
            Err(err) => {
                warn!(bucket = %self.config.bucket, %err, "cold storage unavailable");
                false
            }
        }
    }
}
