pub mod builder;
pub mod embedding;
pub mod loader;

pub use builder::{BuildSummary, IndexBuildError, IndexBuilder};
pub use embedding::{
    embedder_from_config, DeterministicEmbedder, Embedder, EmbeddingError, HttpEmbedder,
};
pub use loader::DEFAULT_KEY_PREFIX;
