use serde::{Deserialize, Serialize};

/// A raw document from the object store, keyed by its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub text: String,
}

impl Document {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// A search hit annotated with its metadata-table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDoc {
    pub doc_id: u32,
    pub doc_key: String,
    pub doc_text: String,
    pub score: f32,
}
