use ragraph_core::model::Document;
use std::path::Path;
use std::sync::Arc;
use storage::{ObjectStore, ObjectStoreError, INDEX_NAMESPACE};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_KEY_PREFIX: &str = "datasets/";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("document {key} is not valid UTF-8")]
    InvalidUtf8 { key: String },
    #[error("no text could be extracted from PDF {key}")]
    UnreadablePdf { key: String },
    #[error("object store error: {0}")]
    Store(#[from] ObjectStoreError),
}

impl LoadError {
    pub fn doc_key(&self) -> Option<&str> {
        match self {
            LoadError::InvalidUtf8 { key } | LoadError::UnreadablePdf { key } => Some(key),
            LoadError::Store(ObjectStoreError::NotFound { key, .. }) => Some(key),
            LoadError::Store(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Pdf,
}

pub fn detect_content_kind(key: &str) -> ContentKind {
    let ext = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "pdf" => ContentKind::Pdf,
        _ => ContentKind::Text,
    }
}

/// Decodes one stored object. Returns `None` when the text is blank after trimming.
pub fn decode_document(key: &str, bytes: Vec<u8>) -> Result<Option<Document>, LoadError> {
    let text = match detect_content_kind(key) {
        ContentKind::Text => String::from_utf8(bytes).map_err(|_| LoadError::InvalidUtf8 {
            key: key.to_string(),
        })?,
        ContentKind::Pdf => {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|_| LoadError::UnreadablePdf {
                key: key.to_string(),
            })?
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(Document::new(key, text)))
}

/// Every document under `prefix`, in key order. Index snapshots stored in the
/// same bucket are never treated as documents.
pub async fn load_documents(
    store: &Arc<dyn ObjectStore>,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<Document>, LoadError> {
    let keys = store.list(bucket, prefix).await?;
    debug!(bucket, prefix, count = keys.len(), "listed document keys");

    let mut documents = Vec::with_capacity(keys.len());
    for key in keys {
        if key.starts_with(INDEX_NAMESPACE) || key.ends_with('/') {
            continue;
        }
        let bytes = store.get(bucket, &key).await?;
        match decode_document(&key, bytes)? {
            Some(document) => documents.push(document),
            None => warn!(bucket, key = %key, "skipping empty document"),
        }
    }
    Ok(documents)
}
