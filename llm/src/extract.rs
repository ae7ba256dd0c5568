use crate::generation::{GenerationError, GenerationRequest, Generator, InferenceConfig};
use ragraph_core::conversation::{Conversation, Message};
use ragraph_core::error::{ErrorCode, RagraphError};
use ragraph_core::graph::Graph;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an expert in graph database modeling. Read the input text and describe it as a property graph.

1. Identify the entities (nodes) and the relationships (edges) between them, with the properties each one carries.
2. Give every node at least one label such as Person or Company, and an identifying property such as id or name.
3. Give every edge an uppercase type with underscores, a direction, and source/target matchers that repeat the labels and identifying properties of the nodes they connect.
4. Property values must be strings, numbers or booleans.
5. Text may be in any language, including Japanese. Keep its meaning.

Answer with a single JSON object and nothing else, following this schema:
{
  "nodes": [
    { "labels": ["STRING"], "properties": { "key": "value" } }
  ],
  "edges": [
    {
      "source": { "labels": ["STRING"], "properties": { "key": "value" } },
      "target": { "labels": ["STRING"], "properties": { "key": "value" } },
      "type": "STRING",
      "properties": { "key": "value" }
    }
  ]
}

Example input: 'Alice is the CEO of TechCorp. She previously worked at DataSoft from 2015 to 2020.'
Example output:
{
  "nodes": [
    { "labels": ["Person"], "properties": { "name": "Alice" } },
    { "labels": ["Company"], "properties": { "name": "TechCorp" } },
    { "labels": ["Company"], "properties": { "name": "DataSoft" } }
  ],
  "edges": [
    {
      "source": { "labels": ["Person"], "properties": { "name": "Alice" } },
      "target": { "labels": ["Company"], "properties": { "name": "TechCorp" } },
      "type": "WORKS_AS",
      "properties": { "role": "CEO" }
    },
    {
      "source": { "labels": ["Person"], "properties": { "name": "Alice" } },
      "target": { "labels": ["Company"], "properties": { "name": "DataSoft" } },
      "type": "WORKED_AT",
      "properties": { "from": "2015", "to": "2020" }
    }
  ]
}
"#;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Text input is required")]
    EmptyText,
    #[error("model returned a malformed graph: {detail}")]
    MalformedGraph { detail: String },
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl RagraphError for ExtractionError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ExtractionError::EmptyText => ErrorCode::InvalidArgument,
            ExtractionError::MalformedGraph { .. } => ErrorCode::UpstreamInvalid,
            ExtractionError::Generation(err) => err.error_code(),
        }
    }
}

/// Removes one surrounding markdown code fence (with optional info string).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    match body.split_once('\n') {
        Some((info, inner)) if !info.contains('`') => inner.trim(),
        _ => trimmed,
    }
}

/// Decodes a model reply into a validated [`Graph`].
pub fn parse_graph_reply(reply: &str) -> Result<Graph, ExtractionError> {
    let body = strip_code_fence(reply);
    let graph: Graph =
        serde_json::from_str(body).map_err(|e| ExtractionError::MalformedGraph {
            detail: format!("reply is not a graph JSON object: {e}"),
        })?;
    graph
        .validate()
        .map_err(|e| ExtractionError::MalformedGraph {
            detail: e.to_string(),
        })?;
    Ok(graph)
}

pub struct GraphExtractor {
    generator: Arc<dyn Generator>,
}

impl GraphExtractor {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    pub async fn extract(&self, text: &str) -> Result<Graph, ExtractionError> {
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyText);
        }

        let prompt = format!(
            "Convert the following text into a graph structure.\nText to analyze: {text}"
        );
        let reply = self
            .generator
            .generate(GenerationRequest {
                system: EXTRACTION_SYSTEM_PROMPT.to_string(),
                conversation: Conversation::new().with_message(Message::user(prompt)),
                inference: InferenceConfig::extraction(),
            })
            .await?;
        debug!(reply_len = reply.len(), "extraction reply received");

        let graph = parse_graph_reply(&reply)?;
        info!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "graph extracted"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    const ALICE_ACME: &str = r#"{
        "nodes": [
            {"labels": ["Person"], "properties": {"name": "Alice"}},
            {"labels": ["Company"], "properties": {"name": "Acme"}}
        ],
        "edges": [
            {
                "source": {"labels": ["Person"], "properties": {"name": "Alice"}},
                "target": {"labels": ["Company"], "properties": {"name": "Acme"}},
                "type": "WORKS_FOR",
                "properties": {}
            }
        ]
    }"#;

    #[test]
    fn strips_one_fence_only() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
        assert_eq!(strip_code_fence("Here you go: {}"), "Here you go: {}");
    }

    #[tokio::test]
    async fn extracts_fenced_graph_with_deterministic_settings() {
        let reply = format!("```json\n{ALICE_ACME}\n```");
        let generator = Arc::new(ScriptedGenerator::new([reply]));
        let extractor = GraphExtractor::new(generator.clone());

        let graph = extractor.extract("Alice works for Acme.").await.unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);

        let requests = generator.requests().await;
        assert_eq!(requests[0].inference, InferenceConfig::extraction());
        assert_eq!(
            requests[0].conversation.last().unwrap().text(),
            "Convert the following text into a graph structure.\nText to analyze: Alice works for Acme."
        );
    }

    #[tokio::test]
    async fn prose_reply_is_malformed() {
        let generator = Arc::new(ScriptedGenerator::new(["Sure! Here is the graph: {}"]));
        let err = GraphExtractor::new(generator).extract("text").await.unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedGraph { .. }));
        assert_eq!(err.status_code(), 502);
    }

    #[tokio::test]
    async fn dangling_edge_is_malformed() {
        let reply = r#"{
            "nodes": [{"labels": ["Person"], "properties": {"name": "Alice"}}],
            "edges": [{
                "source": {"labels": ["Person"], "properties": {"name": "Alice"}},
                "target": {"labels": ["Company"], "properties": {"name": "Initech"}},
                "type": "WORKS_FOR"
            }]
        }"#;
        let generator = Arc::new(ScriptedGenerator::new([reply]));
        let err = GraphExtractor::new(generator).extract("text").await.unwrap_err();
        let ExtractionError::MalformedGraph { detail } = err else {
            panic!("expected malformed graph");
        };
        assert!(detail.contains("does not match any declared node"));
    }

    #[tokio::test]
    async fn empty_text_never_reaches_the_model() {
        let generator = Arc::new(ScriptedGenerator::new(["{}"]));
        let err = GraphExtractor::new(generator.clone()).extract("  ").await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
        assert!(generator.requests().await.is_empty());
    }
}
