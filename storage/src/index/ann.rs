use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("vector index needs a non-zero dimension")]
    ZeroDimension,
    #[error("doc_id {0} is out of sequence")]
    OutOfSequence(u32),
}

#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Clone)]
#[archive(check_bytes)]
pub struct IndexEntry {
    pub doc_id: u32,
    pub vector: Vec<f32>,
}

/// Exact nearest-neighbour index over one fixed dimension. Entries are held in
/// `doc_id` order; the index is built once and never mutated afterwards.
#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Clone)]
#[archive(check_bytes)]
pub struct VectorIndex {
    dimension: u32,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dimension: dimension as u32,
            entries: Vec::new(),
        })
    }

    /// Appends the next vector. `doc_id`s must be dense and start at 0.
    pub fn push(&mut self, doc_id: u32, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }
        if doc_id as usize != self.entries.len() {
            return Err(IndexError::OutOfSequence(doc_id));
        }
        self.entries.push(IndexEntry { doc_id, vector });
        Ok(())
    }

    /// Top-`k` entries by cosine similarity, best first. Equal scores keep
    /// ascending `doc_id` order so results are reproducible.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        if query.len() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        let mut scores: Vec<(u32, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry.doc_id, cosine_similarity(query, &entry.vector)))
            .collect();

        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores.truncate(k);
        Ok(scores)
    }

    pub fn dimension(&self) -> usize {
        self.dimension as usize
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cosine similarity of two equal-length vectors. A zero-norm side (or a
/// non-finite result) scores 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a * norm_b);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}
