//! Filesystem object store
//!
//! Each bucket is a directory under the root and each key a file path
//! relative to it. Writes go to a temporary sibling and are renamed into
//! place, so readers never observe a partially written object.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tierroute_core::object_store::{
    CopyObjectRequest, DeleteObjectRequest, ObjectStore, ObjectStoreError, ObjectStoreResult,
    ObjectSummary, PutObjectRequest, StoredObject,
};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const TEMP_SUFFIX: &str = ".tierroute-tmp";

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn create_bucket(&self, bucket: &str) -> ObjectStoreResult<()> {
        let dir = self.bucket_dir(bucket)?;
        fs::create_dir_all(&dir).await?;
        Ok(())
    }

    fn bucket_dir(&self, bucket: &str) -> ObjectStoreResult<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket.starts_with('.') {
            return Err(ObjectStoreError::NoSuchBucket(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    /// Existing bucket directory
    async fn existing_bucket(&self, bucket: &str) -> ObjectStoreResult<PathBuf> {
        let dir = self.bucket_dir(bucket)?;
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(ObjectStoreError::NoSuchBucket(bucket.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NoSuchBucket(bucket.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn object_path(&self, bucket: &str, key: &str) -> ObjectStoreResult<PathBuf> {
        let dir = self.existing_bucket(bucket).await?;
        Ok(dir.join(check_key(key)?))
    }

    async fn write_atomic(path: &Path, body: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp = path.as_os_str().to_owned();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        let result: io::Result<()> = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(body).await?;
            file.sync_all().await?;
            fs::rename(&temp, path).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp).await;
        }
        result
    }
}

/// Relative path for a key; rejects anything that would escape the bucket
fn check_key(key: &str) -> ObjectStoreResult<PathBuf> {
    let invalid = || ObjectStoreError::InvalidKey(key.to_string());

    if key.ends_with(TEMP_SUFFIX) || key.contains('\\') {
        return Err(invalid());
    }
    if key
        .split('/')
        .any(|segment| matches!(segment, "" | "." | ".."))
    {
        return Err(invalid());
    }

    Ok(PathBuf::from(key))
}

fn not_found(bucket: &str, key: &str) -> impl FnOnce(io::Error) -> ObjectStoreError {
    let (bucket, key) = (bucket.to_string(), key.to_string());
    move |err| match err.kind() {
        io::ErrorKind::NotFound => ObjectStoreError::NotFound { bucket, key },
        _ => ObjectStoreError::Io(err),
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<StoredObject> {
        let path = self.object_path(bucket, key).await?;

        let body = fs::read(&path).await.map_err(not_found(bucket, key))?;
        let modified = fs::metadata(&path).await?.modified()?;

        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body: body.into(),
            content_type: None,
            last_modified: DateTime::<Utc>::from(modified),
        })
    }

    async fn put_object(&self, request: PutObjectRequest) -> ObjectStoreResult<()> {
        let path = self.object_path(&request.bucket, &request.key).await?;
        Self::write_atomic(&path, &request.body).await?;
        debug!(path = %path.display(), size = request.body.len(), "Object written");
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> ObjectStoreResult<Vec<ObjectSummary>> {
        let bucket_dir = self.existing_bucket(bucket).await?;
        let mut summaries = Vec::new();
        let mut pending = vec![bucket_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                let path = entry.path();

                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&bucket_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if key.ends_with(TEMP_SUFFIX) || !prefix.is_none_or(|p| key.starts_with(p)) {
                    continue;
                }

                summaries.push(ObjectSummary {
                    bucket: bucket.to_string(),
                    key,
                    size: meta.len(),
                    last_modified: DateTime::<Utc>::from(meta.modified()?),
                });
            }
        }

        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(summaries)
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> ObjectStoreResult<()> {
        let source = self
            .object_path(&request.source_bucket, &request.source_key)
            .await?;
        let destination = self
            .object_path(&request.destination_bucket, &request.destination_key)
            .await?;

        let body = fs::read(&source)
            .await
            .map_err(not_found(&request.source_bucket, &request.source_key))?;
        Self::write_atomic(&destination, &body).await?;
        Ok(())
    }

    async fn delete_object(&self, request: DeleteObjectRequest) -> ObjectStoreResult<()> {
        let path = self.object_path(&request.bucket, &request.key).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
