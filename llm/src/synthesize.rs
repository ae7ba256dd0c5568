use crate::extract::strip_code_fence;
use crate::generation::{GenerationError, GenerationRequest, Generator, InferenceConfig};
use async_trait::async_trait;
use graph::{render_merge_script, validate_idempotent, GraphScript, IdempotencyError};
use ragraph_core::config::{SynthesisConfig, SynthesisStrategy};
use ragraph_core::conversation::{Conversation, Message};
use ragraph_core::error::{ErrorCode, RagraphError};
use ragraph_core::graph::{Graph, GraphValidationError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are an expert in graph databases and the openCypher query language. Convert the JSON graph you are given into openCypher statements that can be run against the same database any number of times without creating duplicates.

Rules:
1. Start with one `CREATE CONSTRAINT IF NOT EXISTS FOR (n:Label) REQUIRE n.key IS UNIQUE;` per label and identifying property (id, otherwise name).
2. Write every node with `MERGE` on its labels and identifying property, then `SET n += {...}` for the remaining properties.
3. Write every relationship as `MATCH (a:Label {key: value}), (b:Label {key: value}) MERGE (a)-[r:TYPE]->(b)` followed by `SET r += {...}` when it has properties.
4. Never use a bare CREATE for data. Never use DELETE, DETACH, REMOVE or DROP.
5. Use literal values, not parameters. Escape quotes inside strings. Keep strings, numbers and booleans as they are.
6. One statement per line, each ending with a semicolon.
7. Output only the statements: no comments, no explanations, no markdown.

Example output:
CREATE CONSTRAINT IF NOT EXISTS FOR (n:Person) REQUIRE n.name IS UNIQUE;
MERGE (n:Person {name: 'Alice'}) SET n += {age: 41};
MERGE (n:Company {name: 'Acme'});
MATCH (a:Person {name: 'Alice'}), (b:Company {name: 'Acme'}) MERGE (a)-[r:WORKS_FOR]->(b);
"#;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("graph is invalid: {0}")]
    InvalidGraph(#[from] GraphValidationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("model returned an empty script")]
    EmptyScript,
    #[error(transparent)]
    NonIdempotent(#[from] IdempotencyError),
    #[error("graph could not be encoded for the prompt: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RagraphError for SynthesisError {
    fn error_code(&self) -> ErrorCode {
        match self {
            SynthesisError::InvalidGraph(err) => err.error_code(),
            SynthesisError::Generation(err) => err.error_code(),
            SynthesisError::EmptyScript => ErrorCode::UpstreamInvalid,
            SynthesisError::NonIdempotent(err) => err.error_code(),
            SynthesisError::Encode(_) => ErrorCode::Internal,
        }
    }
}

/// Turns a validated graph into an idempotent mutation script.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, graph: &Graph) -> Result<GraphScript, SynthesisError>;
}

/// Asks the generation service for the script.
pub struct ModelSynthesizer {
    generator: Arc<dyn Generator>,
    enforce_idempotent: bool,
}

impl ModelSynthesizer {
    pub fn new(generator: Arc<dyn Generator>, enforce_idempotent: bool) -> Self {
        Self {
            generator,
            enforce_idempotent,
        }
    }
}

#[async_trait]
impl Synthesizer for ModelSynthesizer {
    #[instrument(skip_all, fields(nodes = graph.nodes.len(), edges = graph.edges.len()))]
    async fn synthesize(&self, graph: &Graph) -> Result<GraphScript, SynthesisError> {
        graph.validate()?;

        let payload = serde_json::to_string(graph)?;
        let prompt = format!(
            "Convert the following JSON into a OpenCypher query.\nNode Relation Json to analyze: {payload}"
        );
        let reply = self
            .generator
            .generate(GenerationRequest {
                system: SYNTHESIS_SYSTEM_PROMPT.to_string(),
                conversation: Conversation::new().with_message(Message::user(prompt)),
                inference: InferenceConfig::extraction(),
            })
            .await?;

        let script = GraphScript::new(strip_code_fence(&reply));
        if script.is_blank() {
            return Err(SynthesisError::EmptyScript);
        }
        if self.enforce_idempotent {
            if let Err(err) = validate_idempotent(&script) {
                warn!(error = %err, "rejected generated script");
                return Err(err.into());
            }
        }
        info!(bytes = script.as_str().len(), "script synthesized");
        Ok(script)
    }
}

/// Renders the script from the graph itself without a model call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateSynthesizer;

#[async_trait]
impl Synthesizer for TemplateSynthesizer {
    async fn synthesize(&self, graph: &Graph) -> Result<GraphScript, SynthesisError> {
        Ok(render_merge_script(graph)?)
    }
}

pub fn synthesizer_from_config(
    config: &SynthesisConfig,
    generator: Arc<dyn Generator>,
) -> Arc<dyn Synthesizer> {
    match config.strategy {
        SynthesisStrategy::Model => {
            Arc::new(ModelSynthesizer::new(generator, config.enforce_idempotent))
        }
        SynthesisStrategy::Template => Arc::new(TemplateSynthesizer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;
    use ragraph_core::graph::{GraphEdge, GraphNode, Properties};

    fn alice_acme() -> Graph {
        let alice = GraphNode::new(["Person"]).with_property("name", "Alice");
        let acme = GraphNode::new(["Company"]).with_property("name", "Acme");
        Graph {
            edges: vec![GraphEdge {
                source: alice.reference(),
                target: acme.reference(),
                edge_type: "WORKS_FOR".to_string(),
                properties: Properties::new(),
            }],
            nodes: vec![alice, acme],
        }
    }

    const MERGE_SCRIPT: &str = "MERGE (n:Person {name: 'Alice'});\n\
        MERGE (n:Company {name: 'Acme'});\n\
        MATCH (a:Person {name: 'Alice'}), (b:Company {name: 'Acme'}) MERGE (a)-[r:WORKS_FOR]->(b);";

    #[tokio::test]
    async fn model_script_is_returned_without_fence() {
        let generator = Arc::new(ScriptedGenerator::new([format!("```cypher\n{MERGE_SCRIPT}\n```")]));
        let synthesizer = ModelSynthesizer::new(generator.clone(), true);

        let script = synthesizer.synthesize(&alice_acme()).await.unwrap();
        assert_eq!(script.as_str(), MERGE_SCRIPT);

        let requests = generator.requests().await;
        let prompt = requests[0].conversation.last().unwrap().text();
        assert!(prompt.starts_with(
            "Convert the following JSON into a OpenCypher query.\nNode Relation Json to analyze: {"
        ));
        assert!(requests[0].system.contains("MERGE"));
    }

    #[tokio::test]
    async fn create_script_is_rejected_when_enforced() {
        let reply = "CREATE (n:Person {name: 'Alice'});";
        let strict = ModelSynthesizer::new(Arc::new(ScriptedGenerator::new([reply])), true);
        let err = strict.synthesize(&alice_acme()).await.unwrap_err();
        assert!(matches!(err, SynthesisError::NonIdempotent(_)));
        assert_eq!(err.status_code(), 502);

        let lenient = ModelSynthesizer::new(Arc::new(ScriptedGenerator::new([reply])), false);
        assert_eq!(lenient.synthesize(&alice_acme()).await.unwrap().as_str(), reply);
    }

    #[tokio::test]
    async fn invalid_graph_is_a_bad_request() {
        let mut graph = alice_acme();
        graph.nodes.pop();
        let generator = Arc::new(ScriptedGenerator::new([MERGE_SCRIPT]));
        let err = ModelSynthesizer::new(generator.clone(), true)
            .synthesize(&graph)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(generator.requests().await.is_empty());
    }

    #[tokio::test]
    async fn template_strategy_needs_no_model() {
        let config = SynthesisConfig {
            strategy: SynthesisStrategy::Template,
            enforce_idempotent: true,
        };
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let synthesizer = synthesizer_from_config(&config, generator.clone());
        let script = synthesizer.synthesize(&alice_acme()).await.unwrap();
        assert!(script.as_str().contains("MERGE (a)-[r:WORKS_FOR]->(b);"));
        assert!(generator.requests().await.is_empty());
    }

    #[test]
    fn encoding_failure_is_internal() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SynthesisError::from(source);
        assert_eq!(err.error_code(), ErrorCode::Internal);
        assert_eq!(err.status_code(), 500);
    }
}
