pub mod ann;
pub mod metadata;

pub use ann::{cosine_similarity, IndexEntry, IndexError, VectorIndex};
pub use metadata::{DocMetadata, MetadataTable};
