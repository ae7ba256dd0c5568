use ingestion::{Embedder, EmbeddingError};
use ragraph_core::error::{ErrorCode, RagraphError};
use ragraph_core::model::RetrievedDoc;
use std::sync::Arc;
use storage::{IndexSnapshot, IndexStore, IndexStoreError, IndexVersion};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("k must be at least 1")]
    InvalidK,
    #[error("embedding service error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("embedding service error: query has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Index(#[from] IndexStoreError),
    #[error("index entry {0} has no metadata")]
    MissingMetadata(u32),
}

impl RetrievalError {
    pub fn is_index_not_found(&self) -> bool {
        matches!(
            self,
            RetrievalError::Index(
                IndexStoreError::NoCurrentIndex { .. } | IndexStoreError::VersionNotFound { .. }
            )
        )
    }
}

impl RagraphError for RetrievalError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RetrievalError::InvalidK => ErrorCode::InvalidArgument,
            RetrievalError::Embedding(err) => err.error_code(),
            RetrievalError::DimensionMismatch { .. } => ErrorCode::UpstreamInvalid,
            RetrievalError::Index(err) => err.error_code(),
            RetrievalError::MissingMetadata(_) => ErrorCode::Internal,
        }
    }
}

/// Top `min(k, n)` documents of `snapshot` for `query`, best first. Equal scores
/// keep ascending `doc_id` order.
pub async fn search(
    snapshot: &IndexSnapshot,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<Vec<RetrievedDoc>, RetrievalError> {
    if k == 0 {
        return Err(RetrievalError::InvalidK);
    }

    let vector = embedder.embed(query).await?;
    let expected = snapshot.index().dimension();
    if vector.len() != expected {
        return Err(RetrievalError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }

    let hits = snapshot
        .index()
        .search(&vector, k)
        .map_err(|_| RetrievalError::DimensionMismatch {
            expected,
            actual: vector.len(),
        })?;

    hits.into_iter()
        .map(|(doc_id, score)| {
            let meta = snapshot
                .metadata()
                .get(doc_id)
                .ok_or(RetrievalError::MissingMetadata(doc_id))?;
            Ok(RetrievedDoc {
                doc_id,
                doc_key: meta.doc_key.clone(),
                doc_text: meta.doc_text.clone(),
                score,
            })
        })
        .collect()
}

/// Resolves a bucket's index through the [`IndexStore`] and searches it.
pub struct Retriever {
    index_store: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub index_version: IndexVersion,
    pub docs: Vec<RetrievedDoc>,
}

impl Retriever {
    pub fn new(index_store: Arc<IndexStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index_store,
            embedder,
        }
    }

    /// Searches the named version, or the bucket's current one. The snapshot is
    /// pinned for the whole call, so a concurrent publish does not affect it.
    #[instrument(skip(self, query), fields(index_version))]
    pub async fn retrieve(
        &self,
        bucket: &str,
        version: Option<&IndexVersion>,
        query: &str,
        k: usize,
    ) -> Result<Retrieval, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::InvalidK);
        }
        let snapshot = self.index_store.resolve(bucket, version).await?;
        let index_version = snapshot.version();
        tracing::Span::current().record("index_version", index_version.as_str());

        let docs = search(&snapshot, self.embedder.as_ref(), query, k).await?;
        debug!(hits = docs.len(), "retrieval finished");
        Ok(Retrieval {
            index_version,
            docs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::DeterministicEmbedder;
    use storage::{MetadataTable, VectorIndex};

    fn snapshot(vectors: &[[f32; 2]]) -> IndexSnapshot {
        let mut index = VectorIndex::new(2).unwrap();
        let mut metadata = MetadataTable::new();
        for (i, vector) in vectors.iter().enumerate() {
            let id = metadata.push(format!("datasets/{i}.txt"), format!("doc {i}"));
            index.push(id, vector.to_vec()).unwrap();
        }
        let version = IndexVersion::derive(1, [b"test".as_slice()]);
        IndexSnapshot::new(version, "bucket", "datasets/", 0, index, metadata).unwrap()
    }

    #[tokio::test]
    async fn zero_k_is_rejected() {
        let err = search(&snapshot(&[[1.0, 0.0]]), &DeterministicEmbedder::new(2), "q", 0)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn query_dimension_must_match_index() {
        let err = search(&snapshot(&[[1.0, 0.0]]), &DeterministicEmbedder::new(3), "q", 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn identical_vectors_rank_by_doc_id() {
        let snapshot = snapshot(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]);
        let docs = search(&snapshot, &DeterministicEmbedder::new(2), "anything", 2)
            .await
            .unwrap();
        let ids: Vec<u32> = docs.iter().map(|d| d.doc_id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(docs[0].doc_key, "datasets/0.txt");
    }
}
