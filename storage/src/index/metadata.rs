use rkyv::{Archive, Deserialize, Serialize};

#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
#[archive(check_bytes)]
pub struct DocMetadata {
    pub doc_key: String,
    pub doc_text: String,
}

/// Per-document metadata addressed by `doc_id` (the row position).
#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Eq, Clone, Default)]
#[archive(check_bytes)]
pub struct MetadataTable {
    rows: Vec<DocMetadata>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row and returns its `doc_id`.
    pub fn push(&mut self, doc_key: impl Into<String>, doc_text: impl Into<String>) -> u32 {
        let doc_id = self.rows.len() as u32;
        self.rows.push(DocMetadata {
            doc_key: doc_key.into(),
            doc_text: doc_text.into(),
        });
        doc_id
    }

    pub fn get(&self, doc_id: u32) -> Option<&DocMetadata> {
        self.rows.get(doc_id as usize)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
