//! Object storage DAO
//!
//! Thin pass-through over an [`ObjectStore`] backend. Mutating operations
//! report success as a boolean and log the failure; listing surfaces a
//! distinguished [`StorageError::Listing`] instead.

use tierroute_core::object_store::{
    CopyObjectRequest, DeleteObjectRequest, ObjectStore, ObjectSummary, PutObjectRequest,
    StoredObject,
};
use tracing::{debug, error};

use crate::error::{StorageError, StorageResult};

/// Suffix that marks a prefix as holding a usable object
pub const DEFAULT_MARKER_SUFFIX: &str = "certificate.pem";

pub struct ObjectStorage<S> {
    store: S,
    marker_suffix: String,
}

impl<S: ObjectStore> ObjectStorage<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            marker_suffix: DEFAULT_MARKER_SUFFIX.to_string(),
        }
    }

    pub fn with_marker_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.marker_suffix = suffix.into();
        self
    }

    pub fn marker_suffix(&self) -> &str {
        &self.marker_suffix
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch an object, propagating any backend failure
    pub async fn download(&self, bucket: &str, key: &str) -> StorageResult<StoredObject> {
        Ok(self.store.get_object(bucket, key).await?)
    }

    pub async fn upload(&self, request: PutObjectRequest) -> bool {
        let (bucket, key) = (request.bucket.clone(), request.key.clone());
        match self.store.put_object(request).await {
            Ok(()) => {
                debug!(bucket = %bucket, key = %key, "Object uploaded");
                true
            }
            Err(err) => {
                error!(bucket = %bucket, key = %key, error = %err, "Failed to upload object");
                false
            }
        }
    }

    /// List objects under `prefix/`, or the whole bucket without a prefix
    pub async fn list(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StorageResult<Vec<ObjectSummary>> {
        let prefix = prefix.map(|p| format!("{}/", p));

        self.store
            .list_objects(bucket, prefix.as_deref())
            .await
            .map_err(|source| {
                error!(bucket = %bucket, error = %source, "Failed to list objects");
                StorageError::Listing {
                    bucket: bucket.to_string(),
                    source,
                }
            })
    }

    pub async fn copy(&self, request: CopyObjectRequest) -> bool {
        match self.store.copy_object(request.clone()).await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    source_bucket = %request.source_bucket,
                    source_key = %request.source_key,
                    destination_bucket = %request.destination_bucket,
                    destination_key = %request.destination_key,
                    error = %err,
                    "Failed to copy object"
                );
                false
            }
        }
    }

    pub async fn delete(&self, request: DeleteObjectRequest) -> bool {
        let (bucket, key) = (request.bucket.clone(), request.key.clone());
        match self.store.delete_object(request).await {
            Ok(()) => true,
            Err(err) => {
                error!(bucket = %bucket, key = %key, error = %err, "Failed to delete object");
                false
            }
        }
    }

    /// Whether a non-empty object under `prefix/` ends with the marker suffix
    pub async fn exists(&self, bucket: &str, prefix: &str) -> StorageResult<bool> {
        self.exists_with_suffix(bucket, prefix, &self.marker_suffix)
            .await
    }

    pub async fn exists_with_suffix(
        &self,
        bucket: &str,
        prefix: &str,
        suffix: &str,
    ) -> StorageResult<bool> {
        let objects = self.list(bucket, Some(prefix)).await?;

        Ok(objects
            .iter()
            .filter(|object| object.size != 0)
            .any(|object| object.key.ends_with(suffix)))
    }
}
