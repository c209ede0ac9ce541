//! Object storage capability
//!
//! The storage layer is a thin pass-through over a bucket/key object store.
//! Backends implement [`ObjectStore`]; any transport or backend failure is an
//! [`ObjectStoreError`], and the DAO in `tierroute-storage` decides how each
//! operation surfaces it.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Bucket not found: {0}")]
    NoSuchBucket(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// A downloaded object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl StoredObject {
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Listing entry for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl PutObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            body: body.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyObjectRequest {
    pub source_bucket: String,
    pub source_key: String,
    pub destination_bucket: String,
    pub destination_key: String,
}

impl CopyObjectRequest {
    pub fn new(
        source_bucket: impl Into<String>,
        source_key: impl Into<String>,
        destination_bucket: impl Into<String>,
        destination_key: impl Into<String>,
    ) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
            destination_bucket: destination_bucket.into(),
            destination_key: destination_key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteObjectRequest {
    pub bucket: String,
    pub key: String,
}

impl DeleteObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Bucket/key object store backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a single object
    async fn get_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<StoredObject>;

    /// Create or overwrite an object
    async fn put_object(&self, request: PutObjectRequest) -> ObjectStoreResult<()>;

    /// List objects in a bucket whose key starts with `prefix`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> ObjectStoreResult<Vec<ObjectSummary>>;

    /// Server-side copy
    async fn copy_object(&self, request: CopyObjectRequest) -> ObjectStoreResult<()>;

    /// Remove an object. Removing a missing object is not an error.
    async fn delete_object(&self, request: DeleteObjectRequest) -> ObjectStoreResult<()>;
}
