#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use super::ChatRequest;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invoked with every fragment of an incremental response, in arrival order.
pub type FragmentHandler<'a> = dyn FnMut(&str) + Send + 'a;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidRequest(&'static str),
    #[error("Error generating code: {context}: {source}")]
    Generation { context: String, source: BoxError },
}

impl ChatError {
    pub fn generation<E: Into<BoxError>>(context: &str, source: E) -> ChatError {
        return ChatError::Generation {
            context: context.to_string(),
            source: source.into(),
        };
    }
}

/// Checks a request before anything is sent over the wire.
pub fn validate_request(request: &ChatRequest) -> Result<(), ChatError> {
    if request.messages.is_empty() {
        return Err(ChatError::InvalidRequest("Messages must be a non-empty array"));
    }

    if request.model.trim().is_empty() {
        return Err(ChatError::InvalidRequest("Model must be a non-empty string"));
    }

    if request.max_tokens == Some(0) {
        return Err(ChatError::InvalidRequest(
            "max_tokens must be a positive number",
        ));
    }

    return Ok(());
}

#[async_trait]
pub trait Backend {
    /// Used before generating to verify the backend is reachable.
    async fn health_check(&self) -> Result<()>;

    /// All models the backend can serve, sorted by name.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Sends a chat request and returns the full assistant message.
    ///
    /// With `request.stream` set, every fragment is passed to `on_fragment` as
    /// it arrives and before it is appended to the returned text. Otherwise
    /// `on_fragment` is never called.
    async fn get_completion<'a>(
        &self,
        request: &ChatRequest,
        on_fragment: &mut FragmentHandler<'a>,
    ) -> Result<String, ChatError>;
}

pub type BackendBox = Box<dyn Backend + Send + Sync>;
