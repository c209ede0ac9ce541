//! In-memory object store

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tierroute_core::object_store::{
    CopyObjectRequest, DeleteObjectRequest, ObjectStore, ObjectStoreError, ObjectStoreResult,
    ObjectSummary, PutObjectRequest, StoredObject,
};

/// Process-local object store. Buckets must be created before use.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: DashMap<String, BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bucket; existing buckets are left untouched
    pub fn create_bucket(&self, bucket: impl Into<String>) {
        self.buckets.entry(bucket.into()).or_default();
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets.get(bucket).map(|b| b.len()).unwrap_or(0)
    }
}

fn check_key(key: &str) -> ObjectStoreResult<()> {
    if key.is_empty() {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<StoredObject> {
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| ObjectStoreError::NoSuchBucket(bucket.to_string()))?;

        objects
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put_object(&self, request: PutObjectRequest) -> ObjectStoreResult<()> {
        check_key(&request.key)?;
        let mut objects = self
            .buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| ObjectStoreError::NoSuchBucket(request.bucket.clone()))?;

        let object = StoredObject {
            bucket: request.bucket,
            key: request.key.clone(),
            body: request.body,
            content_type: request.content_type,
            last_modified: Utc::now(),
        };
        objects.insert(request.key, object);
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> ObjectStoreResult<Vec<ObjectSummary>> {
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| ObjectStoreError::NoSuchBucket(bucket.to_string()))?;

        Ok(objects
            .values()
            .filter(|object| prefix.is_none_or(|p| object.key.starts_with(p)))
            .map(|object| ObjectSummary {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
                size: object.size(),
                last_modified: object.last_modified,
            })
            .collect())
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> ObjectStoreResult<()> {
        // Read first; holding a shard guard while writing could deadlock
        let source = self
            .get_object(&request.source_bucket, &request.source_key)
            .await?;

        self.put_object(PutObjectRequest {
            bucket: request.destination_bucket,
            key: request.destination_key,
            body: source.body,
            content_type: source.content_type,
        })
        .await
    }

    async fn delete_object(&self, request: DeleteObjectRequest) -> ObjectStoreResult<()> {
        let mut objects = self
            .buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| ObjectStoreError::NoSuchBucket(request.bucket.clone()))?;
        objects.remove(&request.key);
        Ok(())
    }
}
