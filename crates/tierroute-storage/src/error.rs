//! Storage error types

use thiserror::Error;
use tierroute_core::object_store::ObjectStoreError;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Listing failed; callers can tell this apart from an empty listing
    #[error("Error receiving object list from bucket {bucket}: {source}")]
    Listing {
        bucket: String,
        #[source]
        source: ObjectStoreError,
    },

    #[error(transparent)]
    Backend(#[from] ObjectStoreError),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::Backend(ObjectStoreError::NotFound { .. })
                | StorageError::Backend(ObjectStoreError::NoSuchBucket(_))
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
