#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;

use std::path::Path;

use thiserror::Error;
use tokio::fs;

use super::annotator::parse_header;
use super::annotator::strip_header;
use super::annotator::Provenance;
use super::artifacts::Artifacts;
use super::artifacts::SavedArtifacts;
use crate::domain::models::extract_code;
use crate::domain::models::BackendBox;
use crate::domain::models::ChatError;
use crate::domain::models::ChatMessage;
use crate::domain::models::ChatRequest;
use crate::domain::models::CodeBlock;
use crate::domain::models::CredentialStoreBox;
use crate::domain::models::ExecutionResult;
use crate::domain::models::OpenerBox;
use crate::domain::models::SandboxBox;
use crate::domain::models::SandboxError;
use crate::domain::models::SANDBOX_API_KEY;

pub const SYSTEM_PROMPT: &str = r#"You are an expert code generator specializing in data visualization. Generate Python code that creates graphs based on user descriptions. Include sample data in your code. The code should use matplotlib, seaborn, or plotly to generate a visual graph that can be saved as an image. Suppress any warnings related to module pydantic. Format your response as follows:

1. A brief explanation of what the code does
2. The Python code in a code block using triple backticks with "python" language identifier

Example format:
This code creates a bar chart showing sales data.

```python
import matplotlib.pyplot as plt
# Code here
```"#;

pub const DEFAULT_PROMPT: &str = "A bar chart showing monthly sales data for 2023";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "E2B Sandbox API key not found. Set your API key with `graphgen credentials set` to continue."
    )]
    MissingCredential,
    #[error("No code blocks found in the generated response")]
    NoCodeBlocks,
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Sandbox(SandboxError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl From<SandboxError> for PipelineError {
    fn from(err: SandboxError) -> PipelineError {
        return match err {
            SandboxError::MissingCredential => PipelineError::MissingCredential,
            err => PipelineError::Sandbox(err),
        };
    }
}

/// Reported while a run makes progress, in order.
#[derive(Debug)]
pub enum Progress<'a> {
    Generating { model: &'a str },
    Fragment(&'a str),
    Generated,
    Extracted { count: usize },
    Executing,
    Executed { result: &'a ExecutionResult },
    Saved { saved: &'a SavedArtifacts },
}

pub type ProgressHandler<'a> = dyn FnMut(Progress<'_>) + Send + 'a;

pub struct GenerateRequest {
    pub prompt: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

#[derive(Debug)]
pub struct RunReport {
    pub blocks: Vec<CodeBlock>,
    pub execution: ExecutionResult,
    pub saved: SavedArtifacts,
}

/// Prompt → generate → extract → execute → save → open.
pub struct Pipeline {
    backend: BackendBox,
    sandbox: SandboxBox,
    credentials: CredentialStoreBox,
    artifacts: Artifacts,
    opener: OpenerBox,
    api_key_override: Option<String>,
}

impl Pipeline {
    pub fn new(
        backend: BackendBox,
        sandbox: SandboxBox,
        credentials: CredentialStoreBox,
        artifacts: Artifacts,
        opener: OpenerBox,
    ) -> Pipeline {
        return Pipeline {
            backend,
            sandbox,
            credentials,
            artifacts,
            opener,
            api_key_override: None,
        };
    }

    /// A key that takes precedence over the credential store, usually from
    /// `E2B_API_KEY`.
    pub fn with_api_key_override(mut self, api_key: Option<String>) -> Pipeline {
        self.api_key_override = api_key.filter(|key| return !key.trim().is_empty());
        return self;
    }

    pub fn backend(&self) -> &BackendBox {
        return &self.backend;
    }

    pub fn artifacts(&self) -> &Artifacts {
        return &self.artifacts;
    }

    pub async fn api_key(&self) -> Result<Option<String>, PipelineError> {
        if let Some(api_key) = &self.api_key_override {
            return Ok(Some(api_key.to_string()));
        }

        let stored = self.credentials.get(SANDBOX_API_KEY).await?;
        return Ok(stored.filter(|key| return !key.trim().is_empty()));
    }

    async fn require_api_key(&self) -> Result<String, PipelineError> {
        return match self.api_key().await? {
            Some(api_key) => Ok(api_key),
            None => Err(PipelineError::MissingCredential),
        };
    }

    async fn execute_and_save(
        &self,
        api_key: &str,
        code: &str,
        blocks: Vec<CodeBlock>,
        provenance: &Provenance,
        on_progress: &mut ProgressHandler<'_>,
    ) -> Result<RunReport, PipelineError> {
        on_progress(Progress::Executing);
        let execution = self.sandbox.execute(Some(api_key), code).await?;
        tracing::debug!(
            results = execution.results.len(),
            stdout = execution.logs.stdout.len(),
            stderr = execution.logs.stderr.len(),
            "Execution finished"
        );
        on_progress(Progress::Executed { result: &execution });

        let saved = self.artifacts.save(&blocks, provenance, &execution).await?;
        on_progress(Progress::Saved { saved: &saved });
        self.artifacts.present(&saved, &self.opener).await;

        return Ok(RunReport {
            blocks,
            execution,
            saved,
        });
    }

    /// Generates plotting code for `request.prompt`, runs the first block and
    /// saves every block plus the rendered graph.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        on_progress: &mut ProgressHandler<'_>,
    ) -> Result<RunReport, PipelineError> {
        let api_key = self.require_api_key().await?;

        let chat_request = ChatRequest::new(
            &request.model,
            vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(&request.prompt),
            ],
        )
        .streaming(request.stream)
        .with_max_tokens(request.max_tokens);

        on_progress(Progress::Generating {
            model: &request.model,
        });
        let mut forward = |fragment: &str| {
            on_progress(Progress::Fragment(fragment));
        };
        let response = self
            .backend
            .get_completion(&chat_request, &mut forward)
            .await?;
        on_progress(Progress::Generated);

        let blocks = extract_code(&response);
        on_progress(Progress::Extracted {
            count: blocks.len(),
        });
        if blocks.is_empty() {
            tracing::warn!(response = %response, "No code blocks in response");
            return Err(PipelineError::NoCodeBlocks);
        }

        let code = blocks[0].code.to_string();
        let provenance = Provenance::new(&request.prompt, &request.model);
        return self
            .execute_and_save(&api_key, &code, blocks, &provenance, on_progress)
            .await;
    }

    /// Runs an existing Python file. Prompt and model are read back from its
    /// provenance header when it has one.
    pub async fn execute_file(
        &self,
        file_path: &Path,
        on_progress: &mut ProgressHandler<'_>,
    ) -> Result<RunReport, PipelineError> {
        let api_key = self.require_api_key().await?;

        let source = fs::read_to_string(file_path).await.map_err(|err| {
            return anyhow::Error::new(err)
                .context(format!("Failed to read {}", file_path.display()));
        })?;

        let provenance = parse_header(&source, "python")
            .map(|header| return header.provenance)
            .unwrap_or_default();
        let code = strip_header(&source, "python");

        return self
            .execute_and_save(
                &api_key,
                &source,
                vec![CodeBlock::python(code)],
                &provenance,
                on_progress,
            )
            .await;
    }
}
