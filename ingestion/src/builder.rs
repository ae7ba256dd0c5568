use crate::embedding::{Embedder, EmbeddingError};
use crate::loader::{load_documents, LoadError};
use dashmap::DashMap;
use ragraph_core::error::{ErrorCode, RagraphError};
use ragraph_core::model::Document;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use storage::index::IndexError;
use storage::{
    IndexSnapshot, IndexStore, IndexStoreError, IndexVersion, MetadataTable, SnapshotError,
    VectorIndex,
};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum IndexBuildError {
    #[error("no documents to index under {bucket}/{prefix}")]
    NoDocuments { bucket: String, prefix: String },
    #[error("embedding failed for {doc_key}: {source}")]
    Embedding {
        doc_key: String,
        #[source]
        source: EmbeddingError,
    },
    #[error("document {doc_key} embedded to {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        doc_key: String,
        expected: usize,
        actual: usize,
    },
    #[error("failed to load documents: {0}")]
    Load(#[from] LoadError),
    #[error("an index build for bucket {0} is already running")]
    BuildInProgress(String),
    #[error("invalid index: {0}")]
    Index(#[from] IndexError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("publish failed: {0}")]
    Publish(#[from] IndexStoreError),
}

impl IndexBuildError {
    /// Key of the document whose processing aborted the build, if any.
    pub fn failed_doc_key(&self) -> Option<&str> {
        match self {
            IndexBuildError::Embedding { doc_key, .. }
            | IndexBuildError::DimensionMismatch { doc_key, .. } => Some(doc_key),
            IndexBuildError::Load(err) => err.doc_key(),
            _ => None,
        }
    }
}

impl RagraphError for IndexBuildError {
    fn error_code(&self) -> ErrorCode {
        match self {
            IndexBuildError::NoDocuments { .. } => ErrorCode::NotFound,
            IndexBuildError::Embedding { source, .. } => source.error_code(),
            IndexBuildError::DimensionMismatch { .. } => ErrorCode::UpstreamInvalid,
            IndexBuildError::Load(LoadError::Store(err)) => err.error_code(),
            IndexBuildError::Load(_) => ErrorCode::InvalidArgument,
            IndexBuildError::BuildInProgress(_) => ErrorCode::Conflict,
            IndexBuildError::Index(_) | IndexBuildError::Snapshot(_) => ErrorCode::Internal,
            IndexBuildError::Publish(err) => err.error_code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub bucket: String,
    pub version: IndexVersion,
    pub document_count: usize,
}

struct BuildGuard {
    bucket: String,
    in_flight: Arc<DashMap<String, ()>>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.bucket);
    }
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    index_store: Arc<IndexStore>,
    // Buckets with a build currently running.
    in_flight: Arc<DashMap<String, ()>>,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, index_store: Arc<IndexStore>) -> Self {
        Self {
            embedder,
            index_store,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Embeds `documents` in order and assembles a snapshot. `doc_id`s are the
    /// input positions; the first failure aborts the whole build.
    pub async fn build(
        &self,
        bucket: &str,
        key_prefix: &str,
        documents: Vec<Document>,
    ) -> Result<IndexSnapshot, IndexBuildError> {
        if documents.is_empty() {
            return Err(IndexBuildError::NoDocuments {
                bucket: bucket.to_string(),
                prefix: key_prefix.to_string(),
            });
        }

        let mut dimension: Option<usize> = None;
        let mut vectors = Vec::with_capacity(documents.len());
        let mut metadata = MetadataTable::new();

        for document in &documents {
            let vector = self
                .embedder
                .embed(&document.text)
                .await
                .and_then(|v| {
                    if v.is_empty() {
                        Err(EmbeddingError::EmptyVector)
                    } else {
                        Ok(v)
                    }
                })
                .map_err(|source| IndexBuildError::Embedding {
                    doc_key: document.key.clone(),
                    source,
                })?;

            let expected = *dimension.get_or_insert(vector.len());
            if vector.len() != expected {
                return Err(IndexBuildError::DimensionMismatch {
                    doc_key: document.key.clone(),
                    expected,
                    actual: vector.len(),
                });
            }

            let doc_id = metadata.push(document.key.as_str(), document.text.as_str());
            vectors.push((doc_id, vector));
        }

        let mut index = VectorIndex::new(dimension.unwrap_or_default())?;
        for (doc_id, vector) in vectors {
            index.push(doc_id, vector)?;
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let model_id = self.embedder.model_id();
        let parts = std::iter::once(model_id.as_bytes()).chain(
            documents
                .iter()
                .flat_map(|d| [d.key.as_bytes(), d.text.as_bytes()]),
        );
        let version = IndexVersion::derive(now.as_millis(), parts);

        info!(
            bucket,
            %version,
            documents = documents.len(),
            dimension = index.dimension(),
            "index built"
        );
        Ok(IndexSnapshot::new(
            version,
            bucket,
            key_prefix,
            now.as_secs(),
            index,
            metadata,
        )?)
    }

    /// Loads every document under `key_prefix`, builds, then publishes. Only one
    /// build per bucket may run at a time.
    #[instrument(skip(self))]
    pub async fn build_from_store(
        &self,
        bucket: &str,
        key_prefix: &str,
    ) -> Result<BuildSummary, IndexBuildError> {
        let _guard = self.acquire(bucket)?;

        let documents = load_documents(self.index_store.object_store(), bucket, key_prefix).await?;
        let snapshot = self.build(bucket, key_prefix, documents).await?;
        let document_count = snapshot.document_count();
        let version = self.index_store.publish(snapshot).await?;

        Ok(BuildSummary {
            bucket: bucket.to_string(),
            version,
            document_count,
        })
    }

    fn acquire(&self, bucket: &str) -> Result<BuildGuard, IndexBuildError> {
        match self.in_flight.entry(bucket.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(IndexBuildError::BuildInProgress(bucket.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(BuildGuard {
                    bucket: bucket.to_string(),
                    in_flight: Arc::clone(&self.in_flight),
                })
            }
        }
    }
}
