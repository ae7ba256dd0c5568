use crate::dsl::{QueryValidationError, RagQuery, RagQueryRequest};
use crate::retriever::{RetrievalError, Retriever};
use llm::{GenerationError, GenerationRequest, Generator, InferenceConfig};
use ragraph_core::conversation::{Conversation, Message, Role};
use ragraph_core::error::{ErrorCode, RagraphError};
use ragraph_core::model::RetrievedDoc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use storage::IndexVersion;
use thiserror::Error;
use tracing::{info, instrument};

pub const RAG_SYSTEM_PROMPT: &str = "You are an intelligent assistant tasked with answering questions \
based on the provided documents. Use the information from the documents to construct a clear, \
concise, and accurate answer. If the documents do not contain the necessary info, state that \
it's not available.\n";

#[derive(Error, Debug)]
pub enum RagError {
    #[error(transparent)]
    Validation(#[from] QueryValidationError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl RagraphError for RagError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RagError::Validation(err) => err.error_code(),
            RagError::Retrieval(err) => err.error_code(),
            RagError::Generation(err) => err.error_code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagAnswer {
    pub query: String,
    pub answer: String,
    /// Keyed by 0-based rank.
    pub retrieved_docs: BTreeMap<usize, RetrievedDoc>,
    pub index_version: IndexVersion,
}

/// User turn: one block per document (1-based, ranked order) and the question last.
pub fn build_user_message(query: &str, docs: &[RetrievedDoc]) -> Message {
    let blocks = docs
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                "Document {} (source: {}):\n{}\n",
                i + 1,
                doc.doc_key,
                doc.doc_text
            )
        })
        .chain(std::iter::once(format!("Question: {query}\n")));
    Message::from_blocks(Role::User, blocks)
}

pub struct RagOrchestrator {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    inference: InferenceConfig,
}

impl RagOrchestrator {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        inference: InferenceConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            inference,
        }
    }

    pub async fn answer_request(&self, request: &RagQueryRequest) -> Result<RagAnswer, RagError> {
        let query = request.validate()?;
        self.answer(&query).await
    }

    /// Retrieve, then one generation call. The answer is returned verbatim, and an
    /// empty retrieval still asks the model.
    #[instrument(skip(self, query), fields(bucket = %query.bucket, k = query.k))]
    pub async fn answer(&self, query: &RagQuery) -> Result<RagAnswer, RagError> {
        let retrieval = self
            .retriever
            .retrieve(
                &query.bucket,
                query.index_version.as_ref(),
                &query.query,
                query.k,
            )
            .await?;

        let message = build_user_message(&query.query, &retrieval.docs);
        let answer = self
            .generator
            .generate(GenerationRequest {
                system: RAG_SYSTEM_PROMPT.to_string(),
                conversation: Conversation::new().with_message(message),
                inference: self.inference,
            })
            .await?;

        info!(
            index_version = %retrieval.index_version,
            documents = retrieval.docs.len(),
            "answer generated"
        );
        Ok(RagAnswer {
            query: query.query.clone(),
            answer,
            retrieved_docs: retrieval.docs.into_iter().enumerate().collect(),
            index_version: retrieval.index_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_blocks_are_numbered_from_one() {
        let docs = vec![
            RetrievedDoc {
                doc_id: 3,
                doc_key: "datasets/a.txt".to_string(),
                doc_text: "apple".to_string(),
                score: 0.9,
            },
            RetrievedDoc {
                doc_id: 1,
                doc_key: "datasets/b.txt".to_string(),
                doc_text: "banana".to_string(),
                score: 0.1,
            },
        ];
        let message = build_user_message("Which fruit?", &docs);
        let blocks: Vec<&str> = message.content.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(
            blocks,
            vec![
                "Document 1 (source: datasets/a.txt):\napple\n",
                "Document 2 (source: datasets/b.txt):\nbanana\n",
                "Question: Which fruit?\n",
            ]
        );
    }

    #[test]
    fn empty_retrieval_keeps_only_the_question() {
        let message = build_user_message("Anything?", &[]);
        assert_eq!(message.content.len(), 1);
        assert_eq!(message.text(), "Question: Anything?\n");
    }
}
