//! Operation names with their argument and success-body shapes.

use query::RagQueryRequest;
use ragraph_core::conversation::Conversation;
use ragraph_core::graph::Graph;
use ragraph_core::model::RetrievedDoc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use storage::IndexVersion;

/// Ties an operation name to its typed arguments and success body.
pub trait Operation {
    const NAME: &'static str;
    type Args: DeserializeOwned + Serialize;
    type Body: DeserializeOwned + Serialize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    BuildIndex,
    RagQuery,
    CreateVectorCollection,
    DeleteVectorCollection,
    CreateKnowledgeBase,
    DeleteKnowledgeBase,
    ExtractGraph,
    SynthesizeQuery,
    ExecuteGraphQuery,
    Converse,
}

impl OperationKind {
    pub const ALL: [OperationKind; 10] = [
        OperationKind::BuildIndex,
        OperationKind::RagQuery,
        OperationKind::CreateVectorCollection,
        OperationKind::DeleteVectorCollection,
        OperationKind::CreateKnowledgeBase,
        OperationKind::DeleteKnowledgeBase,
        OperationKind::ExtractGraph,
        OperationKind::SynthesizeQuery,
        OperationKind::ExecuteGraphQuery,
        OperationKind::Converse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::BuildIndex => BuildIndex::NAME,
            OperationKind::RagQuery => RagQueryOp::NAME,
            OperationKind::CreateVectorCollection => CreateVectorCollection::NAME,
            OperationKind::DeleteVectorCollection => DeleteVectorCollection::NAME,
            OperationKind::CreateKnowledgeBase => CreateKnowledgeBase::NAME,
            OperationKind::DeleteKnowledgeBase => DeleteKnowledgeBase::NAME,
            OperationKind::ExtractGraph => ExtractGraph::NAME,
            OperationKind::SynthesizeQuery => SynthesizeQuery::NAME,
            OperationKind::ExecuteGraphQuery => ExecuteGraphQuery::NAME,
            OperationKind::Converse => Converse::NAME,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildIndexArgs {
    #[serde(alias = "s3_bucket")]
    pub bucket: String,
    pub key_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateVectorCollectionArgs {
    pub collection_name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteVectorCollectionArgs {
    pub collection_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateKnowledgeBaseArgs {
    pub collection_name: String,
    pub collection_description: String,
    pub knowledge_base_name: String,
    pub description: String,
    pub embedding_model_arn: String,
    pub vector_index_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteKnowledgeBaseArgs {
    pub collection_name: String,
    pub knowledge_base_name: String,
    pub role_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractGraphArgs {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthesizeQueryArgs {
    /// The serialized graph, as returned by `extractGraph`.
    pub node_relation_json: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteGraphQueryArgs {
    pub open_cypher_query: String,
    pub neptune_endpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConverseArgs {
    pub system_prompt: Option<String>,
    /// JSON text of the conversation so far.
    #[serde(alias = "Messages")]
    pub messages: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildIndexBody {
    pub message: String,
    pub index_version: IndexVersion,
    pub document_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagQueryBody {
    pub status: String,
    pub message: String,
    pub query: String,
    pub answer: String,
    #[serde(rename = "retrieved_docs")]
    pub retrieved_docs: BTreeMap<usize, RetrievedDoc>,
    pub index_version: IndexVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverseBody {
    pub messages: Conversation,
}

macro_rules! operation {
    ($ty:ident, $name:literal, $args:ty, $body:ty) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $ty;

        impl Operation for $ty {
            const NAME: &'static str = $name;
            type Args = $args;
            type Body = $body;
        }
    };
}

operation!(BuildIndex, "buildIndex", BuildIndexArgs, BuildIndexBody);
operation!(RagQueryOp, "ragQuery", RagQueryRequest, RagQueryBody);
operation!(
    CreateVectorCollection,
    "createVectorCollection",
    CreateVectorCollectionArgs,
    MessageBody
);
operation!(
    DeleteVectorCollection,
    "deleteVectorCollection",
    DeleteVectorCollectionArgs,
    MessageBody
);
operation!(
    CreateKnowledgeBase,
    "createKnowledgeBase",
    CreateKnowledgeBaseArgs,
    MessageBody
);
operation!(
    DeleteKnowledgeBase,
    "deleteKnowledgeBase",
    DeleteKnowledgeBaseArgs,
    MessageBody
);
operation!(ExtractGraph, "extractGraph", ExtractGraphArgs, Graph);
operation!(SynthesizeQuery, "synthesizeQuery", SynthesizeQueryArgs, String);
operation!(ExecuteGraphQuery, "executeGraphQuery", ExecuteGraphQueryArgs, Value);
operation!(Converse, "converse", ConverseArgs, ConverseBody);
