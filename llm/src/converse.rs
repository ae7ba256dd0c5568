use crate::generation::{GenerationError, GenerationRequest, Generator, InferenceConfig};
use ragraph_core::conversation::{Conversation, Message, Role};
use ragraph_core::error::{ErrorCode, RagraphError};
use thiserror::Error;
use tracing::info;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

#[derive(Error, Debug)]
pub enum ConverseError {
    #[error("conversation must contain at least one message")]
    EmptyConversation,
    #[error("conversation must end with a user message")]
    NoPendingUserTurn,
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl RagraphError for ConverseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ConverseError::EmptyConversation | ConverseError::NoPendingUserTurn => {
                ErrorCode::InvalidArgument
            }
            ConverseError::Generation(err) => err.error_code(),
        }
    }
}

/// Runs one assistant turn and returns the conversation with the reply appended.
/// The input conversation is left untouched.
pub async fn converse(
    generator: &dyn Generator,
    conversation: &Conversation,
    system_prompt: Option<&str>,
) -> Result<Conversation, ConverseError> {
    let last = conversation.last().ok_or(ConverseError::EmptyConversation)?;
    if last.role != Role::User {
        return Err(ConverseError::NoPendingUserTurn);
    }

    let system = system_prompt
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let reply = generator
        .generate(GenerationRequest {
            system: system.to_string(),
            conversation: conversation.clone(),
            inference: InferenceConfig::converse(),
        })
        .await?;
    if reply.trim().is_empty() {
        return Err(GenerationError::EmptyReply.into());
    }

    info!(turns = conversation.len() + 1, "conversation turn completed");
    Ok(conversation.with_message(Message::assistant(reply)))
}
