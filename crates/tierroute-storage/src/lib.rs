//! TierRoute Object Storage
//!
//! This crate provides the object storage layer:
//! - `ObjectStorage` DAO over any [`ObjectStore`] backend
//! - In-memory backend for tests and demos
//! - Filesystem backend (buckets are directories)

pub mod dao;
pub mod error;
pub mod fs;
pub mod memory;

pub use dao::{DEFAULT_MARKER_SUFFIX, ObjectStorage};
pub use error::{StorageError, StorageResult};
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

pub use tierroute_core::object_store::{
    CopyObjectRequest, DeleteObjectRequest, ObjectStore, ObjectStoreError, ObjectSummary,
    PutObjectRequest, StoredObject,
};
