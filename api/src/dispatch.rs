use crate::envelope::Envelope;
use crate::ops::{
    BuildIndex, BuildIndexArgs, BuildIndexBody, Converse, ConverseArgs, ConverseBody,
    CreateKnowledgeBase, CreateKnowledgeBaseArgs, CreateVectorCollection,
    CreateVectorCollectionArgs, DeleteKnowledgeBase, DeleteKnowledgeBaseArgs,
    DeleteVectorCollection, DeleteVectorCollectionArgs, ExecuteGraphQuery, ExecuteGraphQueryArgs,
    ExtractGraph, ExtractGraphArgs, MessageBody, Operation, OperationKind, RagQueryBody,
    RagQueryOp, SynthesizeQuery, SynthesizeQueryArgs,
};
use graph::{
    GraphEndpoint, GraphEndpointError, GraphScript, HttpGraphExecutor, MemoryGraphRegistry,
    RoutingGraphExecutor,
};
use ingestion::{
    embedder_from_config, Embedder, EmbeddingError, IndexBuildError, IndexBuilder,
    DEFAULT_KEY_PREFIX,
};
use llm::{
    converse, generator_from_config, synthesizer_from_config, ConverseError, ExtractionError,
    GenerationError, Generator, GraphExtractor, InferenceConfig, SynthesisError, Synthesizer,
};
use query::{RagError, RagOrchestrator, RagQueryRequest, Retriever};
use ragraph_core::config::AppConfig;
use ragraph_core::conversation::Conversation;
use ragraph_core::error::{ErrorCode, RagraphError};
use ragraph_core::graph::Graph;
use serde_json::Value;
use std::sync::Arc;
use storage::{Catalog, CatalogError, IndexStore, LocalObjectStore, NewKnowledgeBase, ObjectStore};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("embedding setup failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("generation setup failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("graph endpoint setup failed: {0}")]
    Graph(#[from] GraphEndpointError),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid arguments for {operation}: {source}")]
    InvalidArguments {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    MissingInput(&'static str),
    #[error("{field} is not valid JSON: {source}")]
    MalformedInput {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Build(#[from] IndexBuildError),
    #[error(transparent)]
    Rag(#[from] RagError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Graph(#[from] GraphEndpointError),
    #[error(transparent)]
    Converse(#[from] ConverseError),
    #[error("failed to encode response body: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RagraphError for DispatchError {
    fn error_code(&self) -> ErrorCode {
        match self {
            DispatchError::UnknownOperation(_) => ErrorCode::NotFound,
            DispatchError::InvalidArguments { .. }
            | DispatchError::MissingInput(_)
            | DispatchError::MalformedInput { .. } => ErrorCode::InvalidArgument,
            DispatchError::Cancelled => ErrorCode::Cancelled,
            DispatchError::Build(err) => err.error_code(),
            DispatchError::Rag(err) => err.error_code(),
            DispatchError::Catalog(err) => err.error_code(),
            DispatchError::Extraction(err) => err.error_code(),
            DispatchError::Synthesis(err) => err.error_code(),
            DispatchError::Graph(err) => err.error_code(),
            DispatchError::Converse(err) => err.error_code(),
            DispatchError::Serialize(_) => ErrorCode::Internal,
        }
    }

    fn upstream_status(&self) -> Option<u16> {
        match self {
            DispatchError::Graph(err) => err.upstream_status(),
            _ => None,
        }
    }
}

/// Everything an operation may touch.
pub struct Services {
    pub catalog: Catalog,
    pub builder: IndexBuilder,
    pub rag: RagOrchestrator,
    pub extractor: GraphExtractor,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub graph: Arc<dyn GraphEndpoint>,
    pub generator: Arc<dyn Generator>,
}

impl Services {
    /// Wires the pipelines over one object store. Documents, published indexes and
    /// the catalog all live in it.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        catalog_bucket: &str,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        synthesizer: Arc<dyn Synthesizer>,
        graph: Arc<dyn GraphEndpoint>,
        inference: InferenceConfig,
    ) -> Self {
        let index_store = Arc::new(IndexStore::new(Arc::clone(&objects)));
        Self {
            catalog: Catalog::new(objects, catalog_bucket),
            builder: IndexBuilder::new(Arc::clone(&embedder), Arc::clone(&index_store)),
            rag: RagOrchestrator::new(
                Retriever::new(index_store, embedder),
                Arc::clone(&generator),
                inference,
            ),
            extractor: GraphExtractor::new(Arc::clone(&generator)),
            synthesizer,
            graph,
            generator,
        }
    }
}

pub struct Dispatcher {
    services: Services,
}

impl Dispatcher {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, SetupError> {
        let timeouts = &config.timeouts;
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::with_timeout(
            &config.storage.data_dir,
            timeouts.storage(),
        ));
        let embedder = embedder_from_config(&config.embedding, timeouts.embedding())?;
        let generator = generator_from_config(&config.generation, timeouts.generation())?;
        let synthesizer = synthesizer_from_config(&config.synthesis, Arc::clone(&generator));
        let graph: Arc<dyn GraphEndpoint> = Arc::new(RoutingGraphExecutor::new(
            HttpGraphExecutor::new(timeouts.graph())?,
            Arc::new(MemoryGraphRegistry::new()),
        ));

        info!(
            data_dir = %config.storage.data_dir,
            embedding_offline = config.embedding.is_offline(),
            generation_offline = config.generation.is_offline(),
            synthesis = ?config.synthesis.strategy,
            "dispatcher configured"
        );
        Ok(Self::new(Services::new(
            objects,
            &config.storage.catalog_bucket,
            embedder,
            generator,
            synthesizer,
            graph,
            InferenceConfig::answer(&config.generation),
        )))
    }

    /// Runs one operation to completion, or until `cancel` fires. Every outcome,
    /// failures included, is an envelope.
    #[instrument(skip(self, arguments, cancel))]
    pub async fn handle(
        &self,
        operation: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Envelope {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            result = self.run(operation, arguments) => result,
        };

        match result {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(
                    operation,
                    code = %err.error_code(),
                    status = err.status_code(),
                    "operation failed: {err}"
                );
                Envelope::from_error(&err)
            }
        }
    }

    async fn run(&self, operation: &str, arguments: Value) -> Result<Envelope, DispatchError> {
        let kind = OperationKind::parse(operation)
            .ok_or_else(|| DispatchError::UnknownOperation(operation.to_string()))?;
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        match kind {
            OperationKind::BuildIndex => {
                respond::<BuildIndex>(&self.build_index(args::<BuildIndex>(arguments)?).await?)
            }
            OperationKind::RagQuery => {
                respond::<RagQueryOp>(&self.rag_query(args::<RagQueryOp>(arguments)?).await?)
            }
            OperationKind::CreateVectorCollection => respond::<CreateVectorCollection>(
                &self
                    .create_collection(args::<CreateVectorCollection>(arguments)?)
                    .await?,
            ),
            OperationKind::DeleteVectorCollection => respond::<DeleteVectorCollection>(
                &self
                    .delete_collection(args::<DeleteVectorCollection>(arguments)?)
                    .await?,
            ),
            OperationKind::CreateKnowledgeBase => respond::<CreateKnowledgeBase>(
                &self
                    .create_knowledge_base(args::<CreateKnowledgeBase>(arguments)?)
                    .await?,
            ),
            OperationKind::DeleteKnowledgeBase => respond::<DeleteKnowledgeBase>(
                &self
                    .delete_knowledge_base(args::<DeleteKnowledgeBase>(arguments)?)
                    .await?,
            ),
            OperationKind::ExtractGraph => respond::<ExtractGraph>(
                &self
                    .extract_graph(args::<ExtractGraph>(arguments)?)
                    .await?,
            ),
            OperationKind::SynthesizeQuery => respond::<SynthesizeQuery>(
                &self
                    .synthesize_query(args::<SynthesizeQuery>(arguments)?)
                    .await?,
            ),
            OperationKind::ExecuteGraphQuery => respond::<ExecuteGraphQuery>(
                &self
                    .execute_graph_query(args::<ExecuteGraphQuery>(arguments)?)
                    .await?,
            ),
            OperationKind::Converse => {
                respond::<Converse>(&self.converse(args::<Converse>(arguments)?).await?)
            }
        }
    }

    async fn build_index(&self, args: BuildIndexArgs) -> Result<BuildIndexBody, DispatchError> {
        let bucket = args.bucket.trim();
        if bucket.is_empty() {
            return Err(DispatchError::MissingInput(
                "Parameter 'bucket' is missing or empty.",
            ));
        }
        let prefix = args
            .key_prefix
            .as_deref()
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(DEFAULT_KEY_PREFIX);

        let summary = self.services.builder.build_from_store(bucket, prefix).await?;
        Ok(BuildIndexBody {
            message: format!(
                "Index {} published for {}/{}",
                summary.version, summary.bucket, prefix
            ),
            index_version: summary.version,
            document_count: summary.document_count,
        })
    }

    async fn rag_query(&self, request: RagQueryRequest) -> Result<RagQueryBody, DispatchError> {
        let answer = self.services.rag.answer_request(&request).await?;
        let message = if answer.retrieved_docs.is_empty() {
            "No documents were retrieved."
        } else {
            "Answer generated from retrieved documents."
        };
        Ok(RagQueryBody {
            status: "success".to_string(),
            message: message.to_string(),
            query: answer.query,
            answer: answer.answer,
            retrieved_docs: answer.retrieved_docs,
            index_version: answer.index_version,
        })
    }

    async fn create_collection(
        &self,
        args: CreateVectorCollectionArgs,
    ) -> Result<MessageBody, DispatchError> {
        let record = self
            .services
            .catalog
            .create_collection(&args.collection_name, &args.description)
            .await?;
        Ok(MessageBody::new(format!(
            "Collection '{}' created successfully.",
            record.name
        )))
    }

    async fn delete_collection(
        &self,
        args: DeleteVectorCollectionArgs,
    ) -> Result<MessageBody, DispatchError> {
        self.services
            .catalog
            .delete_collection(&args.collection_name)
            .await?;
        Ok(MessageBody::new(format!(
            "Collection {} deleted successfully.",
            args.collection_name
        )))
    }

    async fn create_knowledge_base(
        &self,
        args: CreateKnowledgeBaseArgs,
    ) -> Result<MessageBody, DispatchError> {
        self.services
            .catalog
            .create_knowledge_base(NewKnowledgeBase {
                collection_name: args.collection_name,
                collection_description: args.collection_description,
                name: args.knowledge_base_name,
                description: args.description,
                embedding_model: args.embedding_model_arn,
                vector_index_name: args.vector_index_name,
            })
            .await?;
        Ok(MessageBody::new(
            "Collection and knowledge base created successfully.",
        ))
    }

    async fn delete_knowledge_base(
        &self,
        args: DeleteKnowledgeBaseArgs,
    ) -> Result<MessageBody, DispatchError> {
        self.services
            .catalog
            .delete_knowledge_base(
                &args.collection_name,
                &args.knowledge_base_name,
                &args.role_name,
            )
            .await?;
        Ok(MessageBody::new(
            "Knowledge base and collection deleted successfully.",
        ))
    }

    async fn extract_graph(&self, args: ExtractGraphArgs) -> Result<Graph, DispatchError> {
        Ok(self.services.extractor.extract(&args.text).await?)
    }

    async fn synthesize_query(&self, args: SynthesizeQueryArgs) -> Result<String, DispatchError> {
        if args.node_relation_json.trim().is_empty() {
            return Err(DispatchError::MissingInput(
                "Node Relation Json input is required",
            ));
        }
        let graph: Graph = serde_json::from_str(&args.node_relation_json).map_err(|source| {
            DispatchError::MalformedInput {
                field: "nodeRelationJson",
                source,
            }
        })?;
        let script = self.services.synthesizer.synthesize(&graph).await?;
        Ok(script.into_inner())
    }

    async fn execute_graph_query(
        &self,
        args: ExecuteGraphQueryArgs,
    ) -> Result<Value, DispatchError> {
        let script = GraphScript::new(args.open_cypher_query);
        Ok(self
            .services
            .graph
            .execute(&script, &args.neptune_endpoint)
            .await?)
    }

    async fn converse(&self, args: ConverseArgs) -> Result<ConverseBody, DispatchError> {
        if args.messages.trim().is_empty() {
            return Err(DispatchError::MissingInput("Invalid or missing 'messages'"));
        }
        let conversation: Conversation =
            serde_json::from_str(&args.messages).map_err(|source| {
                DispatchError::MalformedInput {
                    field: "messages",
                    source,
                }
            })?;
        let messages = converse(
            self.services.generator.as_ref(),
            &conversation,
            args.system_prompt.as_deref(),
        )
        .await?;
        Ok(ConverseBody { messages })
    }
}

fn args<O: Operation>(arguments: Value) -> Result<O::Args, DispatchError> {
    serde_json::from_value(arguments).map_err(|source| DispatchError::InvalidArguments {
        operation: O::NAME,
        source,
    })
}

fn respond<O: Operation>(body: &O::Body) -> Result<Envelope, DispatchError> {
    Ok(Envelope::success(body)?)
}
