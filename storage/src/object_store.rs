use async_trait::async_trait;
use ragraph_core::error::{ErrorCode, RagraphError};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Key prefix reserved for in-flight writes of [`LocalObjectStore`].
pub const STAGING_PREFIX: &str = "_staging/";

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("invalid object location: {0}")]
    InvalidLocation(String),
    #[error("IO error on {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{operation} on {location} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        location: String,
        timeout: Duration,
    },
}

impl RagraphError for ObjectStoreError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ObjectStoreError::NotFound { .. } => ErrorCode::NotFound,
            ObjectStoreError::InvalidLocation(_) => ErrorCode::InvalidArgument,
            ObjectStoreError::Io { .. } => ErrorCode::Internal,
            ObjectStoreError::Timeout { .. } => ErrorCode::Timeout,
        }
    }
}

/// Flat bucket/key object storage. `put` replaces an object atomically: a
/// concurrent `get` observes either the previous bytes or the new ones.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError>;

    /// Keys under `prefix`, sorted. "Directory" keys ending in `/` are never returned.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError>;

    async fn get_optional(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        match self.get(bucket, key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(ObjectStoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn validate_bucket(bucket: &str) -> Result<(), ObjectStoreError> {
    let bucket_ok = !bucket.is_empty()
        && !bucket.contains('/')
        && !bucket.contains('\\')
        && bucket != "."
        && bucket != "..";
    if !bucket_ok {
        return Err(ObjectStoreError::InvalidLocation(format!("bucket {bucket:?}")));
    }
    Ok(())
}

fn validate_location(bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
    validate_bucket(bucket)?;
    if key.is_empty() || key.ends_with('/') || key.starts_with(STAGING_PREFIX) {
        return Err(ObjectStoreError::InvalidLocation(format!("key {key:?}")));
    }
    let path = Path::new(key);
    if !path
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(ObjectStoreError::InvalidLocation(format!("key {key:?}")));
    }
    Ok(())
}

/// Filesystem-backed store: `<root>/<bucket>/<key>`.
pub struct LocalObjectStore {
    root: PathBuf,
    timeout: Duration,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_timeout(root, Duration::from_secs(5))
    }

    pub fn with_timeout(root: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            timeout,
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_location(bucket, key)?;
        Ok(self.root.join(bucket).join(key))
    }

    async fn timed<T, F>(
        &self,
        operation: &'static str,
        location: String,
        fut: F,
    ) -> Result<T, ObjectStoreError>
    where
        F: Future<Output = Result<T, ObjectStoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ObjectStoreError::Timeout {
                operation,
                location,
                timeout: self.timeout,
            }),
        }
    }
}

fn io_error(location: &str, source: std::io::Error) -> ObjectStoreError {
    ObjectStoreError::Io {
        location: location.to_string(),
        source,
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        let location = format!("{bucket}/{key}");
        self.timed("get", location.clone(), async {
            match fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                }
                Err(e) => Err(io_error(&location, e)),
            }
        })
        .await
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        let location = format!("{bucket}/{key}");
        let n = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let staging_dir = self.root.join(bucket).join(STAGING_PREFIX);
        let tmp_path = staging_dir.join(format!("{}-{n}", std::process::id()));

        self.timed("put", location.clone(), async {
            fs::create_dir_all(&staging_dir)
                .await
                .map_err(|e| io_error(&location, e))?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(&location, e))?;
            }
            // Write aside then rename: readers never see a partially written object.
            fs::write(&tmp_path, &bytes)
                .await
                .map_err(|e| io_error(&location, e))?;
            if let Err(e) = fs::rename(&tmp_path, &path).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(io_error(&location, e));
            }
            Ok(())
        })
        .await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        validate_bucket(bucket)?;
        let bucket_root = self.root.join(bucket);
        let location = format!("{bucket}/{prefix}");

        self.timed("list", location.clone(), async {
            let mut keys = Vec::new();
            let mut pending = vec![bucket_root.clone()];

            while let Some(dir) = pending.pop() {
                let mut entries = match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(io_error(&location, e)),
                };

                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| io_error(&location, e))?
                {
                    let path = entry.path();
                    let file_type = entry
                        .file_type()
                        .await
                        .map_err(|e| io_error(&location, e))?;
                    if file_type.is_dir() {
                        pending.push(path);
                        continue;
                    }

                    let Ok(relative) = path.strip_prefix(&bucket_root) else {
                        continue;
                    };
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(STAGING_PREFIX) || !key.starts_with(prefix) {
                        continue;
                    }
                    keys.push(key);
                }
            }

            keys.sort();
            Ok(keys)
        })
        .await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        let location = format!("{bucket}/{key}");
        self.timed("delete", location.clone(), async {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                }
                Err(e) => Err(io_error(&location, e)),
            }
        })
        .await
    }
}

/// Process-local store for tests and offline runs.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        validate_location(bucket, key)?;
        let objects = self.objects.read().await;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        validate_location(bucket, key)?;
        let mut objects = self.objects.write().await;
        objects.insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        validate_bucket(bucket)?;
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        validate_location(bucket, key)?;
        let mut objects = self.objects.write().await;
        objects
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| ObjectStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn local_store_put_get_list_delete() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        store
            .put("docs", "datasets/b.txt", b"banana".to_vec())
            .await
            .unwrap();
        store
            .put("docs", "datasets/a.txt", b"apple".to_vec())
            .await
            .unwrap();
        store.put("docs", "other.txt", b"x".to_vec()).await.unwrap();

        assert_eq!(store.get("docs", "datasets/a.txt").await.unwrap(), b"apple");
        assert_eq!(
            store.list("docs", "datasets/").await.unwrap(),
            vec!["datasets/a.txt".to_string(), "datasets/b.txt".to_string()]
        );

        store.delete("docs", "datasets/a.txt").await.unwrap();
        assert!(matches!(
            store.get("docs", "datasets/a.txt").await,
            Err(ObjectStoreError::NotFound { .. })
        ));
        assert!(store
            .get_optional("docs", "datasets/a.txt")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn local_store_put_replaces_whole_object() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        store.put("b", "k", b"first version".to_vec()).await.unwrap();
        store.put("b", "k", b"v2".to_vec()).await.unwrap();

        assert_eq!(store.get("b", "k").await.unwrap(), b"v2");
        assert_eq!(store.list("b", "").await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn list_of_missing_bucket_is_empty() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.list("nothing-here", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let store = InMemoryObjectStore::new();
        for key in ["../escape", "/abs", "dir/", "", "_staging/0-1"] {
            assert!(matches!(
                store.put("b", key, vec![]).await,
                Err(ObjectStoreError::InvalidLocation(_))
            ));
        }
        assert!(matches!(
            store.get("a/b", "k").await,
            Err(ObjectStoreError::InvalidLocation(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_list_is_scoped_to_bucket_and_prefix() {
        let store = InMemoryObjectStore::new();
        store.put("one", "p/a", vec![1]).await.unwrap();
        store.put("one", "q/b", vec![2]).await.unwrap();
        store.put("two", "p/c", vec![3]).await.unwrap();

        assert_eq!(store.list("one", "p/").await.unwrap(), vec!["p/a".to_string()]);
    }

    #[tokio::test]
    async fn tmp_named_keys_are_ordinary_objects() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        store
            .put("docs", "datasets/notes.tmp", b"draft".to_vec())
            .await
            .unwrap();
        store.put("docs", "datasets/a.txt", b"a".to_vec()).await.unwrap();

        assert_eq!(store.get("docs", "datasets/notes.tmp").await.unwrap(), b"draft");
        assert_eq!(
            store.list("docs", "").await.unwrap(),
            vec!["datasets/a.txt".to_string(), "datasets/notes.tmp".to_string()]
        );
        assert!(dir.path().join("docs").join(STAGING_PREFIX).is_dir());
    }
}
