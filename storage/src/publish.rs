use crate::object_store::{ObjectStore, ObjectStoreError};
use crate::snapshot::{IndexSnapshot, IndexVersion, SnapshotError};
use dashmap::DashMap;
use ragraph_core::error::{ErrorCode, RagraphError};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Reserved key namespace inside a document bucket.
pub const INDEX_NAMESPACE: &str = "_indexes/";
const CURRENT_POINTER: &str = "_indexes/CURRENT";
/// Explicitly requested versions kept decoded per bucket, besides the current one.
pub const PINNED_CACHE_CAPACITY: usize = 4;

#[derive(Error, Debug)]
pub enum IndexStoreError {
    #[error("no index published for bucket {bucket}")]
    NoCurrentIndex { bucket: String },
    #[error("index {version} not found in bucket {bucket}")]
    VersionNotFound { bucket: String, version: String },
    #[error("invalid index version {0:?}")]
    InvalidVersion(String),
    #[error("snapshot {version} belongs to bucket {found}, not {bucket}")]
    BucketMismatch {
        bucket: String,
        version: String,
        found: String,
    },
    #[error("object store error: {0}")]
    Store(#[from] ObjectStoreError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl RagraphError for IndexStoreError {
    fn error_code(&self) -> ErrorCode {
        match self {
            IndexStoreError::NoCurrentIndex { .. } | IndexStoreError::VersionNotFound { .. } => {
                ErrorCode::NotFound
            }
            IndexStoreError::InvalidVersion(_) => ErrorCode::InvalidArgument,
            IndexStoreError::BucketMismatch { .. } | IndexStoreError::Snapshot(_) => {
                ErrorCode::Internal
            }
            IndexStoreError::Store(err) => err.error_code(),
        }
    }
}

fn snapshot_key(version: &IndexVersion) -> String {
    format!("{INDEX_NAMESPACE}{version}/snapshot.rkyv")
}

/// Publishes snapshots and resolves them back for search.
///
/// Publication writes the immutable snapshot object first and only then swaps
/// the bucket's CURRENT pointer, so a reader that follows the pointer always
/// finds a complete snapshot. Each bucket caches its current snapshot plus up
/// to [`PINNED_CACHE_CAPACITY`] older versions that were asked for by name.
pub struct IndexStore {
    store: Arc<dyn ObjectStore>,
    cache: DashMap<String, BucketCache>,
}

#[derive(Default)]
struct BucketCache {
    current: Option<Arc<IndexSnapshot>>,
    pinned: VecDeque<Arc<IndexSnapshot>>,
}

impl BucketCache {
    fn get(&self, version: &IndexVersion) -> Option<Arc<IndexSnapshot>> {
        self.current
            .iter()
            .chain(self.pinned.iter())
            .find(|snapshot| snapshot.version() == *version)
            .cloned()
    }

    fn set_current(&mut self, snapshot: Arc<IndexSnapshot>) {
        let version = snapshot.version();
        self.pinned.retain(|pinned| pinned.version() != version);
        self.current = Some(snapshot);
    }

    fn pin(&mut self, snapshot: Arc<IndexSnapshot>) {
        if self.get(&snapshot.version()).is_some() {
            return;
        }
        if self.pinned.len() >= PINNED_CACHE_CAPACITY {
            self.pinned.pop_front();
        }
        self.pinned.push_back(snapshot);
    }
}

impl IndexStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub async fn publish(&self, snapshot: IndexSnapshot) -> Result<IndexVersion, IndexStoreError> {
        let version = snapshot.version();
        let bucket = snapshot.bucket().to_string();
        let key = snapshot_key(&version);

        if self.store.get_optional(&bucket, &key).await?.is_some() {
            // Same version means same content; published snapshots are never rewritten.
            debug!(%bucket, %version, "snapshot already stored");
        } else {
            let bytes = snapshot.encode()?;
            self.store.put(&bucket, &key, bytes).await?;
        }

        self.store
            .put(&bucket, CURRENT_POINTER, version.as_str().as_bytes().to_vec())
            .await?;

        info!(
            %bucket,
            %version,
            documents = snapshot.document_count(),
            "index published"
        );
        self.cache
            .entry(bucket)
            .or_default()
            .set_current(Arc::new(snapshot));
        Ok(version)
    }

    /// Version the bucket's CURRENT pointer names.
    pub async fn current(&self, bucket: &str) -> Result<IndexVersion, IndexStoreError> {
        let raw = self
            .store
            .get_optional(bucket, CURRENT_POINTER)
            .await?
            .ok_or_else(|| IndexStoreError::NoCurrentIndex {
                bucket: bucket.to_string(),
            })?;
        let text = String::from_utf8_lossy(&raw);
        IndexVersion::parse(&text).ok_or_else(|| IndexStoreError::InvalidVersion(text.into_owned()))
    }

    pub async fn load(
        &self,
        bucket: &str,
        version: &IndexVersion,
    ) -> Result<Arc<IndexSnapshot>, IndexStoreError> {
        self.load_cached(bucket, version, false).await
    }

    async fn load_cached(
        &self,
        bucket: &str,
        version: &IndexVersion,
        is_current: bool,
    ) -> Result<Arc<IndexSnapshot>, IndexStoreError> {
        if let Some(snapshot) = self.cache.get(bucket).and_then(|entry| entry.get(version)) {
            if is_current {
                if let Some(mut entry) = self.cache.get_mut(bucket) {
                    entry.set_current(Arc::clone(&snapshot));
                }
            }
            return Ok(snapshot);
        }

        let bytes = self
            .store
            .get_optional(bucket, &snapshot_key(version))
            .await?
            .ok_or_else(|| IndexStoreError::VersionNotFound {
                bucket: bucket.to_string(),
                version: version.to_string(),
            })?;
        let snapshot = IndexSnapshot::decode(&bytes)?;
        if snapshot.bucket() != bucket || snapshot.version() != *version {
            return Err(IndexStoreError::BucketMismatch {
                bucket: bucket.to_string(),
                version: version.to_string(),
                found: snapshot.bucket().to_string(),
            });
        }

        let snapshot = Arc::new(snapshot);
        let mut entry = self.cache.entry(bucket.to_string()).or_default();
        if is_current {
            entry.set_current(Arc::clone(&snapshot));
        } else {
            entry.pin(Arc::clone(&snapshot));
        }
        Ok(snapshot)
    }

    /// Loads the named version, or whatever CURRENT points at when none is given.
    pub async fn resolve(
        &self,
        bucket: &str,
        version: Option<&IndexVersion>,
    ) -> Result<Arc<IndexSnapshot>, IndexStoreError> {
        match version {
            Some(version) => self.load(bucket, version).await,
            None => {
                let current = self.current(bucket).await?;
                self.load_cached(bucket, &current, true).await
            }
        }
    }

    /// Drops cached snapshots. Stored objects are untouched.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[cfg(test)]
    fn cached_versions(&self, bucket: &str) -> Vec<IndexVersion> {
        self.cache
            .get(bucket)
            .map(|entry| {
                entry
                    .current
                    .iter()
                    .chain(entry.pinned.iter())
                    .map(|snapshot| snapshot.version())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MetadataTable, VectorIndex};
    use crate::object_store::{InMemoryObjectStore, LocalObjectStore};
    use tempfile::tempdir;

    fn snapshot(bucket: &str, millis: u128, text: &str) -> IndexSnapshot {
        let mut index = VectorIndex::new(2).unwrap();
        let mut metadata = MetadataTable::new();
        let doc_id = metadata.push("datasets/doc.txt", text);
        index.push(doc_id, vec![1.0, 0.5]).unwrap();
        let version = IndexVersion::derive(millis, [text.as_bytes()]);
        IndexSnapshot::new(version, bucket, "datasets/", 0, index, metadata).unwrap()
    }

    #[tokio::test]
    async fn unpublished_bucket_has_no_index() {
        let store = IndexStore::new(Arc::new(InMemoryObjectStore::new()));
        assert!(matches!(
            store.resolve("docs", None).await,
            Err(IndexStoreError::NoCurrentIndex { .. })
        ));
        let missing = IndexVersion::parse("idx-1-00000000").unwrap();
        let err = store.resolve("docs", Some(&missing)).await.unwrap_err();
        assert!(matches!(err, IndexStoreError::VersionNotFound { .. }));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn republish_moves_current_and_keeps_old_version_readable() {
        let dir = tempdir().unwrap();
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path()));
        let store = IndexStore::new(Arc::clone(&objects));

        let first = store.publish(snapshot("docs", 1, "first")).await.unwrap();
        let second = store.publish(snapshot("docs", 2, "second")).await.unwrap();
        assert_ne!(first, second);

        // A fresh store has no cache: everything comes back from disk.
        let reader = IndexStore::new(objects);
        assert_eq!(reader.current("docs").await.unwrap(), second);
        let old = reader.load("docs", &first).await.unwrap();
        assert_eq!(old.metadata().get(0).unwrap().doc_text, "first");
        let current = reader.resolve("docs", None).await.unwrap();
        assert_eq!(current.metadata().get(0).unwrap().doc_text, "second");
    }

    #[tokio::test]
    async fn snapshot_from_other_bucket_is_refused() {
        let objects: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let store = IndexStore::new(Arc::clone(&objects));
        let version = store.publish(snapshot("a", 1, "x")).await.unwrap();

        let bytes = objects.get("a", &snapshot_key(&version)).await.unwrap();
        objects.put("b", &snapshot_key(&version), bytes).await.unwrap();

        assert!(matches!(
            store.load("b", &version).await,
            Err(IndexStoreError::BucketMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn republish_evicts_the_superseded_snapshot() {
        let store = IndexStore::new(Arc::new(InMemoryObjectStore::new()));
        let first = store.publish(snapshot("docs", 1, "first")).await.unwrap();
        let second = store.publish(snapshot("docs", 2, "second")).await.unwrap();
        assert_eq!(store.cached_versions("docs"), vec![second.clone()]);

        // The old version is still readable, and comes back as a pin.
        let old = store.load("docs", &first).await.unwrap();
        assert_eq!(old.metadata().get(0).unwrap().doc_text, "first");
        assert_eq!(store.cached_versions("docs"), vec![second, first]);
    }

    #[tokio::test]
    async fn pinned_versions_are_bounded_per_bucket() {
        let store = IndexStore::new(Arc::new(InMemoryObjectStore::new()));
        let mut versions = Vec::new();
        for millis in 0..(PINNED_CACHE_CAPACITY as u128 + 3) {
            let text = format!("rev {millis}");
            versions.push(store.publish(snapshot("docs", millis, &text)).await.unwrap());
        }
        let current = store.current("docs").await.unwrap();
        store.clear_cache();

        for version in &versions[..versions.len() - 1] {
            store.load("docs", version).await.unwrap();
        }
        store.resolve("docs", None).await.unwrap();

        let cached = store.cached_versions("docs");
        assert_eq!(cached.len(), PINNED_CACHE_CAPACITY + 1);
        assert_eq!(cached[0], current);
        assert!(!cached.contains(&versions[0]));
    }
}
