pub mod dsl;
pub mod rag;
pub mod retriever;

pub use dsl::{QueryValidationError, RagQuery, RagQueryRequest, DEFAULT_K};
pub use rag::{RagAnswer, RagError, RagOrchestrator, RAG_SYSTEM_PROMPT};
pub use retriever::{search, Retrieval, RetrievalError, Retriever};
