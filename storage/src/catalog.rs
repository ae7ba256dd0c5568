use crate::object_store::{ObjectStore, ObjectStoreError};
use ragraph_core::error::{ErrorCode, RagraphError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const DEFAULT_ROLE_NAME: &str = "knowledge-base-role";

const COLLECTIONS_PREFIX: &str = "collections/";
const KNOWLEDGE_BASES_PREFIX: &str = "knowledge-bases/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Collection,
    KnowledgeBase,
}

impl std::fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogKind::Collection => write!(f, "collection"),
            CatalogKind::KnowledgeBase => write!(f, "knowledge base"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: CatalogKind,
        name: String,
        reason: &'static str,
    },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: CatalogKind, name: String },
    #[error("{kind} {name} not found")]
    NotFound { kind: CatalogKind, name: String },
    #[error("collection {collection} is used by knowledge base {knowledge_base}")]
    InUse {
        collection: String,
        knowledge_base: String,
    },
    #[error("knowledge base {name} is not attached to collection {collection}")]
    CollectionMismatch { name: String, collection: String },
    #[error("knowledge base {name} uses role {expected}, not {actual}")]
    RoleMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("object store error: {0}")]
    Store(#[from] ObjectStoreError),
    #[error("catalog record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl RagraphError for CatalogError {
    fn error_code(&self) -> ErrorCode {
        match self {
            CatalogError::InvalidName { .. }
            | CatalogError::MissingField(_)
            | CatalogError::CollectionMismatch { .. }
            | CatalogError::RoleMismatch { .. } => ErrorCode::InvalidArgument,
            CatalogError::AlreadyExists { .. } | CatalogError::InUse { .. } => ErrorCode::Conflict,
            CatalogError::NotFound { .. } => ErrorCode::NotFound,
            CatalogError::Store(err) => err.error_code(),
            CatalogError::Codec(_) => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub name: String,
    pub description: String,
    pub created_at_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseRecord {
    pub name: String,
    pub description: String,
    pub collection_name: String,
    pub embedding_model: String,
    pub vector_index_name: String,
    pub role_name: String,
    pub created_at_unix: u64,
}

#[derive(Debug, Clone, Default)]
pub struct NewKnowledgeBase {
    pub collection_name: String,
    pub collection_description: String,
    pub name: String,
    pub description: String,
    pub embedding_model: String,
    pub vector_index_name: String,
}

/// 3-32 characters of `[a-z0-9-]`, starting with a letter.
pub fn validate_collection_name(name: &str) -> Result<(), CatalogError> {
    let invalid = |reason| CatalogError::InvalidName {
        kind: CatalogKind::Collection,
        name: name.to_string(),
        reason,
    };
    if !(3..=32).contains(&name.len()) {
        return Err(invalid("must be 3 to 32 characters"));
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(invalid("must start with a lowercase letter"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("may only contain a-z, 0-9 and '-'"));
    }
    Ok(())
}

pub fn validate_knowledge_base_name(name: &str) -> Result<(), CatalogError> {
    let invalid = |reason| CatalogError::InvalidName {
        kind: CatalogKind::KnowledgeBase,
        name: name.to_string(),
        reason,
    };
    if name.is_empty() || name.len() > 100 {
        return Err(invalid("must be 1 to 100 characters"));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("must start with a letter or digit"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid("may only contain letters, digits, '-' and '_'"));
    }
    Ok(())
}

fn require(value: &str, field: &'static str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        Err(CatalogError::MissingField(field))
    } else {
        Ok(())
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Vector collections and knowledge bases, stored as JSON records in one bucket.
pub struct Catalog {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    role_name: String,
    // Serializes read-check-write sequences on the records.
    write_lock: Mutex<()>,
}

impl Catalog {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self::with_role(store, bucket, DEFAULT_ROLE_NAME)
    }

    pub fn with_role(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            role_name: role_name.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn create_collection(
        &self,
        name: &str,
        description: &str,
    ) -> Result<CollectionRecord, CatalogError> {
        validate_collection_name(name)?;
        let _guard = self.write_lock.lock().await;
        self.insert_collection(name, description).await
    }

    async fn insert_collection(
        &self,
        name: &str,
        description: &str,
    ) -> Result<CollectionRecord, CatalogError> {
        if self.collection(name).await?.is_some() {
            return Err(CatalogError::AlreadyExists {
                kind: CatalogKind::Collection,
                name: name.to_string(),
            });
        }
        let record = CollectionRecord {
            name: name.to_string(),
            description: description.to_string(),
            created_at_unix: now_unix(),
        };
        self.write(&collection_key(name), &record).await?;
        info!(collection = name, "collection created");
        Ok(record)
    }

    pub async fn delete_collection(&self, name: &str) -> Result<(), CatalogError> {
        validate_collection_name(name)?;
        let _guard = self.write_lock.lock().await;

        if self.collection(name).await?.is_none() {
            return Err(CatalogError::NotFound {
                kind: CatalogKind::Collection,
                name: name.to_string(),
            });
        }
        if let Some(kb) = self
            .knowledge_bases()
            .await?
            .into_iter()
            .find(|kb| kb.collection_name == name)
        {
            return Err(CatalogError::InUse {
                collection: name.to_string(),
                knowledge_base: kb.name,
            });
        }

        self.store.delete(&self.bucket, &collection_key(name)).await?;
        info!(collection = name, "collection deleted");
        Ok(())
    }

    /// Creates the knowledge base, and its collection when that does not exist yet.
    pub async fn create_knowledge_base(
        &self,
        request: NewKnowledgeBase,
    ) -> Result<KnowledgeBaseRecord, CatalogError> {
        validate_collection_name(&request.collection_name)?;
        validate_knowledge_base_name(&request.name)?;
        require(&request.embedding_model, "embeddingModelArn")?;
        require(&request.vector_index_name, "vectorIndexName")?;

        let _guard = self.write_lock.lock().await;
        if self.knowledge_base(&request.name).await?.is_some() {
            return Err(CatalogError::AlreadyExists {
                kind: CatalogKind::KnowledgeBase,
                name: request.name,
            });
        }
        let created_collection = self.collection(&request.collection_name).await?.is_none();
        if created_collection {
            self.insert_collection(&request.collection_name, &request.collection_description)
                .await?;
        }

        let record = KnowledgeBaseRecord {
            name: request.name,
            description: request.description,
            collection_name: request.collection_name,
            embedding_model: request.embedding_model,
            vector_index_name: request.vector_index_name,
            role_name: self.role_name.clone(),
            created_at_unix: now_unix(),
        };
        if let Err(err) = self.write(&knowledge_base_key(&record.name), &record).await {
            if created_collection {
                let key = collection_key(&record.collection_name);
                if let Err(rollback) = self.store.delete(&self.bucket, &key).await {
                    warn!(
                        collection = %record.collection_name,
                        error = %rollback,
                        "failed to remove collection after knowledge base write failed"
                    );
                }
            }
            return Err(err);
        }
        info!(
            knowledge_base = %record.name,
            collection = %record.collection_name,
            "knowledge base created"
        );
        Ok(record)
    }

    /// Removes the knowledge base together with its collection.
    pub async fn delete_knowledge_base(
        &self,
        collection_name: &str,
        name: &str,
        role_name: &str,
    ) -> Result<(), CatalogError> {
        require(collection_name, "collectionName")?;
        require(name, "knowledgeBaseName")?;
        require(role_name, "roleName")?;

        let _guard = self.write_lock.lock().await;
        let record = self
            .knowledge_base(name)
            .await?
            .ok_or_else(|| CatalogError::NotFound {
                kind: CatalogKind::KnowledgeBase,
                name: name.to_string(),
            })?;
        if record.collection_name != collection_name {
            return Err(CatalogError::CollectionMismatch {
                name: name.to_string(),
                collection: collection_name.to_string(),
            });
        }
        if record.role_name != role_name {
            return Err(CatalogError::RoleMismatch {
                name: name.to_string(),
                expected: record.role_name,
                actual: role_name.to_string(),
            });
        }

        self.store.delete(&self.bucket, &knowledge_base_key(name)).await?;
        match self.store.delete(&self.bucket, &collection_key(collection_name)).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        info!(knowledge_base = name, collection = collection_name, "knowledge base deleted");
        Ok(())
    }

    pub async fn collection(&self, name: &str) -> Result<Option<CollectionRecord>, CatalogError> {
        self.read(&collection_key(name)).await
    }

    pub async fn knowledge_base(
        &self,
        name: &str,
    ) -> Result<Option<KnowledgeBaseRecord>, CatalogError> {
        self.read(&knowledge_base_key(name)).await
    }

    pub async fn knowledge_bases(&self) -> Result<Vec<KnowledgeBaseRecord>, CatalogError> {
        let mut records = Vec::new();
        for key in self.store.list(&self.bucket, KNOWLEDGE_BASES_PREFIX).await? {
            if let Some(record) = self.read(&key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn read<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CatalogError> {
        match self.store.get_optional(&self.bucket, key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(&self, key: &str, record: &T) -> Result<(), CatalogError> {
        let bytes = serde_json::to_vec_pretty(record)?;
        self.store.put(&self.bucket, key, bytes).await?;
        Ok(())
    }
}

fn collection_key(name: &str) -> String {
    format!("{COLLECTIONS_PREFIX}{name}.json")
}

fn knowledge_base_key(name: &str) -> String {
    format!("{KNOWLEDGE_BASES_PREFIX}{name}.json")
}
