use ragraph_core::config::EmbeddingConfig;
use ragraph_core::error::{ErrorCode, RagraphError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding service returned no vector")]
    EmptyVector,
    #[error("embedding configuration error: {0}")]
    Config(String),
}

impl RagraphError for EmbeddingError {
    fn error_code(&self) -> ErrorCode {
        match self {
            EmbeddingError::Http(err) if err.is_timeout() => ErrorCode::Timeout,
            EmbeddingError::Http(err) if err.is_decode() => ErrorCode::UpstreamInvalid,
            EmbeddingError::Http(_) | EmbeddingError::Status { .. } => {
                ErrorCode::UpstreamUnavailable
            }
            EmbeddingError::EmptyVector => ErrorCode::UpstreamInvalid,
            EmbeddingError::Config(_) => ErrorCode::Internal,
        }
    }
}

/// Maps text to a vector. One call embeds one text; callers never retry.
pub trait Embedder: Send + Sync {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbeddingError>>;

    fn model_id(&self) -> &str;
}

/// Offline embedder. Vectors are derived from SHA-256 of the model id and the
/// text, so identical `(model, text)` pairs always embed identically.
pub struct DeterministicEmbedder {
    model_id: String,
    dims: usize,
}

impl DeterministicEmbedder {
    pub fn new(dims: usize) -> Self {
        Self::with_model("embedding-default-v1", dims)
    }

    pub fn with_model(model_id: impl Into<String>, dims: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dims: dims.max(1),
        }
    }

    /// One digest per 32 dimensions, keyed by block number; each byte maps onto `[-1, 1]`.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dims);
        let mut block: u32 = 0;
        while out.len() < self.dims {
            let digest = Sha256::new()
                .chain_update((self.model_id.len() as u64).to_le_bytes())
                .chain_update(self.model_id.as_bytes())
                .chain_update(block.to_le_bytes())
                .chain_update(text.as_bytes())
                .finalize();
            let remaining = self.dims - out.len();
            out.extend(
                digest
                    .iter()
                    .take(remaining)
                    .map(|&byte| f32::from(byte) / 127.5 - 1.0),
            );
            block += 1;
        }
        out
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Embedder for DeterministicEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbeddingError>> {
        Box::pin(async move { Ok(self.vector(text)) })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `POST {endpoint}/embeddings` API.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }
}

impl Embedder for HttpEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbeddingError>> {
        Box::pin(async move {
            let url = format!("{}/embeddings", self.endpoint);
            let mut request = self.client.post(&url).json(&EmbeddingRequest {
                model: &self.model,
                input: [text],
            });
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(EmbeddingError::Status { status, body });
            }

            let result: EmbeddingResponse = response.json().await?;
            result
                .data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .filter(|v| !v.is_empty())
                .ok_or(EmbeddingError::EmptyVector)
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// The configured HTTP embedder, or the deterministic one when no endpoint is set.
pub fn embedder_from_config(
    config: &EmbeddingConfig,
    timeout: Duration,
) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    if config.is_offline() {
        if config.dimensions == 0 {
            return Err(EmbeddingError::Config(
                "embedding.dimensions must be positive".to_string(),
            ));
        }
        return Ok(Arc::new(DeterministicEmbedder::with_model(
            config.model.clone(),
            config.dimensions,
        )));
    }
    Ok(Arc::new(HttpEmbedder::new(
        config.endpoint.clone(),
        config.model.clone(),
        config.api_key(),
        timeout,
    )?))
}
