use async_trait::async_trait;
use thiserror::Error;

use super::BoxError;
use super::ExecutionResult;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error(
        "E2B Sandbox API key not found. Set your API key with `graphgen credentials set` to continue."
    )]
    MissingCredential,
    #[error("Sandbox execution failed: {context}: {source}")]
    Upstream { context: String, source: BoxError },
}

impl SandboxError {
    pub fn upstream<E: Into<BoxError>>(context: &str, source: E) -> SandboxError {
        return SandboxError::Upstream {
            context: context.to_string(),
            source: source.into(),
        };
    }
}

#[async_trait]
pub trait Sandbox {
    /// Runs `code` in a fresh environment that only lives for this call. The
    /// environment is torn down on every path once it has been created.
    async fn execute(&self, api_key: Option<&str>, code: &str)
        -> Result<ExecutionResult, SandboxError>;
}

pub type SandboxBox = Box<dyn Sandbox + Send + Sync>;
