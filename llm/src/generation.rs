use async_trait::async_trait;
use ragraph_core::config::GenerationConfig;
use ragraph_core::conversation::{Conversation, Role};
use ragraph_core::error::{ErrorCode, RagraphError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InferenceConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl InferenceConfig {
    pub fn answer(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.answer_max_tokens,
            temperature: config.answer_temperature,
            top_p: config.answer_top_p,
        }
    }

    /// Deterministic settings for structured output.
    pub const fn extraction() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.0,
            top_p: 0.0,
        }
    }

    pub const fn converse() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 1.0,
            top_p: 0.999,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self::answer(&GenerationConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub conversation: Conversation,
    pub inference: InferenceConfig,
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation service returned an empty reply")]
    EmptyReply,
    #[error("no generation service is configured")]
    NotConfigured,
    #[error("generation configuration error: {0}")]
    Config(String),
}

impl RagraphError for GenerationError {
    fn error_code(&self) -> ErrorCode {
        match self {
            GenerationError::Http(err) if err.is_timeout() => ErrorCode::Timeout,
            GenerationError::Http(err) if err.is_decode() => ErrorCode::UpstreamInvalid,
            GenerationError::Http(_) | GenerationError::Status { .. } => {
                ErrorCode::UpstreamUnavailable
            }
            GenerationError::EmptyReply => ErrorCode::UpstreamInvalid,
            GenerationError::NotConfigured => ErrorCode::UpstreamUnavailable,
            GenerationError::Config(_) => ErrorCode::Internal,
        }
    }
}

/// One request, one reply. Callers never retry.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Client for an OpenAI-compatible `POST {endpoint}/chat/completions` API.
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut messages = Vec::with_capacity(request.conversation.len() + 1);
        if !request.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: request.system.clone(),
            });
        }
        for message in request.conversation.messages() {
            messages.push(ChatMessage {
                role: role_name(message.role),
                content: message.text(),
            });
        }

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: request.inference.max_tokens,
            temperature: request.inference.temperature,
            top_p: request.inference.top_p,
        };

        let url = format!("{}/chat/completions", self.endpoint);
        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(GenerationError::EmptyReply)
    }
}

/// Stands in when `generation.endpoint` is empty; every call fails.
pub struct UnconfiguredGenerator;

#[async_trait]
impl Generator for UnconfiguredGenerator {
    async fn generate(&self, _request: GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::NotConfigured)
    }
}

pub fn generator_from_config(
    config: &GenerationConfig,
    timeout: Duration,
) -> Result<Arc<dyn Generator>, GenerationError> {
    if config.is_offline() {
        return Ok(Arc::new(UnconfiguredGenerator));
    }
    if config.model.trim().is_empty() {
        return Err(GenerationError::Config(
            "generation.model must be set".to_string(),
        ));
    }
    Ok(Arc::new(HttpGenerator::new(
        config.endpoint.clone(),
        config.model.clone(),
        config.api_key(),
        timeout,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;
    use ragraph_core::conversation::Message;

    fn request(text: &str) -> GenerationRequest {
        GenerationRequest {
            system: String::new(),
            conversation: Conversation::new().with_message(Message::user(text)),
            inference: InferenceConfig::extraction(),
        }
    }

    #[tokio::test]
    async fn scripted_generator_replays_in_order() {
        let generator = ScriptedGenerator::new(["one", "two"]);
        assert_eq!(generator.generate(request("a")).await.unwrap(), "one");
        assert_eq!(generator.generate(request("b")).await.unwrap(), "two");
        assert!(matches!(
            generator.generate(request("c")).await,
            Err(GenerationError::EmptyReply)
        ));
        assert_eq!(generator.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn offline_config_yields_unconfigured_generator() {
        let generator =
            generator_from_config(&GenerationConfig::default(), Duration::from_secs(1)).unwrap();
        let err = generator.generate(request("x")).await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured));
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn answer_settings_come_from_config() {
        let settings = InferenceConfig::answer(&GenerationConfig::default());
        assert_eq!(settings.max_tokens, 500);
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.top_p, 0.8);
    }
}
