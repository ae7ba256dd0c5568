use crate::memory::{MemoryGraphError, MemoryGraphRegistry};
use crate::script::GraphScript;
use async_trait::async_trait;
use ragraph_core::error::{ErrorCode, RagraphError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const MEMORY_SCHEME: &str = "memory://";

#[derive(Error, Debug, Clone, PartialEq)]
#[error("graph endpoint returned {status_code}: {detail}")]
pub struct GraphEndpointError {
    pub status_code: u16,
    pub detail: String,
}

impl GraphEndpointError {
    pub fn new(status_code: u16, detail: impl Into<String>) -> Self {
        Self {
            status_code,
            detail: detail.into(),
        }
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(400, detail)
    }
}

impl RagraphError for GraphEndpointError {
    fn error_code(&self) -> ErrorCode {
        match self.status_code {
            400 => ErrorCode::InvalidArgument,
            504 => ErrorCode::Timeout,
            401..=499 => ErrorCode::UpstreamInvalid,
            _ => ErrorCode::UpstreamUnavailable,
        }
    }

    fn upstream_status(&self) -> Option<u16> {
        Some(self.status_code)
    }
}

impl From<MemoryGraphError> for GraphEndpointError {
    fn from(err: MemoryGraphError) -> Self {
        Self::invalid_input(err.to_string())
    }
}

/// Submits a whole script as one request and returns the endpoint's results.
#[async_trait]
pub trait GraphEndpoint: Send + Sync {
    async fn execute(&self, script: &GraphScript, endpoint: &str)
        -> Result<Value, GraphEndpointError>;
}

fn check_inputs(script: &GraphScript, endpoint: &str) -> Result<(), GraphEndpointError> {
    if script.is_blank() {
        return Err(GraphEndpointError::invalid_input(
            "Open Cypher Query input is required",
        ));
    }
    if endpoint.trim().is_empty() {
        return Err(GraphEndpointError::invalid_input(
            "Neptune Endpoint input is required",
        ));
    }
    Ok(())
}

/// openCypher over HTTP: `POST {endpoint}` with the form field `query`.
pub struct HttpGraphExecutor {
    client: reqwest::Client,
}

impl HttpGraphExecutor {
    pub fn new(timeout: Duration) -> Result<Self, GraphEndpointError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GraphEndpointError::new(500, e.to_string()))?;
        Ok(Self { client })
    }
}

fn transport_error(err: reqwest::Error) -> GraphEndpointError {
    if err.is_timeout() {
        GraphEndpointError::new(504, format!("graph endpoint timed out: {err}"))
    } else {
        GraphEndpointError::new(502, format!("graph endpoint unreachable: {err}"))
    }
}

#[async_trait]
impl GraphEndpoint for HttpGraphExecutor {
    async fn execute(
        &self,
        script: &GraphScript,
        endpoint: &str,
    ) -> Result<Value, GraphEndpointError> {
        check_inputs(script, endpoint)?;
        let endpoint = endpoint.trim();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(GraphEndpointError::invalid_input(format!(
                "unsupported graph endpoint {endpoint}"
            )));
        }

        debug!(endpoint, bytes = script.as_str().len(), "submitting graph script");
        let response = self
            .client
            .post(endpoint)
            .form(&[("query", script.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(GraphEndpointError::new(status.as_u16(), body));
        }

        let mut value: Value = serde_json::from_str(&body).map_err(|e| {
            GraphEndpointError::new(502, format!("graph endpoint returned invalid JSON: {e}"))
        })?;
        if let Some(results) = value.get_mut("results") {
            return Ok(results.take());
        }
        Ok(value)
    }
}

/// Sends `memory://<name>` endpoints to process-local graphs and everything else
/// over HTTP.
pub struct RoutingGraphExecutor {
    http: HttpGraphExecutor,
    memory: Arc<MemoryGraphRegistry>,
}

impl RoutingGraphExecutor {
    pub fn new(http: HttpGraphExecutor, memory: Arc<MemoryGraphRegistry>) -> Self {
        Self { http, memory }
    }

    pub fn memory(&self) -> &Arc<MemoryGraphRegistry> {
        &self.memory
    }
}

#[async_trait]
impl GraphEndpoint for RoutingGraphExecutor {
    async fn execute(
        &self,
        script: &GraphScript,
        endpoint: &str,
    ) -> Result<Value, GraphEndpointError> {
        check_inputs(script, endpoint)?;
        let Some(name) = endpoint.trim().strip_prefix(MEMORY_SCHEME) else {
            return self.http.execute(script, endpoint).await;
        };
        if name.is_empty() {
            return Err(GraphEndpointError::invalid_input(
                "memory endpoint needs a graph name",
            ));
        }

        let graph = self.memory.get_or_create(name);
        let stats = graph.execute(script).await?;
        info!(
            graph = name,
            nodes_created = stats.nodes_created,
            relationships_created = stats.relationships_created,
            "executed script against in-memory graph"
        );
        serde_json::to_value([stats]).map_err(|e| GraphEndpointError::new(500, e.to_string()))
    }
}
