#[cfg(test)]
#[path = "e2b_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ExecutionError;
use crate::domain::models::ExecutionResult;
use crate::domain::models::ResultItem;
use crate::domain::models::Sandbox;
use crate::domain::models::SandboxError;

const EXECUTION_PORT: u16 = 49999;

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CreateSandboxRequest {
    #[serde(rename = "templateID")]
    template_id: String,
    timeout: u64,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CreateSandboxResponse {
    #[serde(rename = "sandboxID")]
    sandbox_id: String,
    #[serde(
        rename = "envdAccessToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    envd_access_token: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ExecuteRequest {
    code: String,
}

/// One line of the execution stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ExecutionEvent {
    Stdout {
        text: String,
    },
    Stderr {
        text: String,
    },
    Result(ResultItem),
    Error {
        name: String,
        value: String,
        #[serde(default)]
        traceback: String,
    },
    NumberOfExecutions {
        execution_count: u64,
    },
    EndOfExecution,
    #[serde(other)]
    Unknown,
}

/// A running sandbox. Owned by exactly one `execute` call.
struct SandboxHandle {
    sandbox_id: String,
    access_token: Option<String>,
}

/// Client for E2B code interpreter sandboxes.
pub struct E2B {
    api_url: String,
    domain: String,
    execution_url: Option<String>,
    template: String,
    timeout: u64,
}

impl E2B {
    pub fn new(config: &Config) -> Result<E2B> {
        return Ok(E2B {
            api_url: config.get(ConfigKey::SandboxApiURL),
            domain: config.get(ConfigKey::SandboxDomain),
            execution_url: config.get_opt(ConfigKey::SandboxExecutionURL),
            template: config.get(ConfigKey::SandboxTemplate),
            timeout: config.parse::<u64>(ConfigKey::SandboxTimeout)?,
        });
    }

    fn execution_url(&self, handle: &SandboxHandle) -> String {
        if let Some(url) = &self.execution_url {
            return url.trim_end_matches('/').to_string();
        }

        return format!(
            "https://{EXECUTION_PORT}-{id}.{domain}",
            id = handle.sandbox_id,
            domain = self.domain
        );
    }

    async fn create(&self, api_key: &str) -> Result<SandboxHandle, SandboxError> {
        let req = CreateSandboxRequest {
            template_id: self.template.to_string(),
            timeout: self.timeout,
        };

        let res = reqwest::Client::new()
            .post(format!("{url}/sandboxes", url = self.api_url))
            .header("X-API-KEY", api_key)
            .json(&req)
            .send()
            .await
            .map_err(|err| return SandboxError::upstream("Sandbox service is unreachable", err))?;

        if !res.status().is_success() {
            let status = res.status();
            tracing::error!(status = status.as_u16(), "Failed to create sandbox");
            let body = res.text().await.unwrap_or_default();
            return Err(SandboxError::upstream(
                &format!("Failed to create sandbox ({})", status.as_u16()),
                body,
            ));
        }

        let body = res
            .json::<CreateSandboxResponse>()
            .await
            .map_err(|err| return SandboxError::upstream("Invalid sandbox response", err))?;
        tracing::debug!(sandbox_id = %body.sandbox_id, "Created sandbox");

        return Ok(SandboxHandle {
            sandbox_id: body.sandbox_id,
            access_token: body.envd_access_token,
        });
    }

    async fn run(&self, handle: &SandboxHandle, code: &str) -> Result<ExecutionResult, SandboxError> {
        let mut req = reqwest::Client::new()
            .post(format!("{url}/execute", url = self.execution_url(handle)))
            .timeout(Duration::from_secs(self.timeout))
            .json(&ExecuteRequest {
                code: code.to_string(),
            });
        if let Some(token) = &handle.access_token {
            req = req.header("X-Access-Token", token);
        }

        let res = req
            .send()
            .await
            .map_err(|err| return SandboxError::upstream("Sandbox is unreachable", err))?;

        if !res.status().is_success() {
            let status = res.status();
            tracing::error!(status = status.as_u16(), "Failed to execute code in sandbox");
            let body = res.text().await.unwrap_or_default();
            return Err(SandboxError::upstream(
                &format!("Failed to execute code ({})", status.as_u16()),
                body,
            ));
        }

        let stream = res.bytes_stream().map_err(convert_err);
        let mut lines_reader = StreamReader::new(stream).lines();
        let mut result = ExecutionResult::default();

        while let Some(line) = lines_reader
            .next_line()
            .await
            .map_err(|err| return SandboxError::upstream("Execution stream interrupted", err))?
        {
            if line.trim().is_empty() {
                continue;
            }

            let event = serde_json::from_str::<ExecutionEvent>(&line)
                .map_err(|err| return SandboxError::upstream("Invalid execution output", err))?;

            match event {
                ExecutionEvent::Stdout { text } => result.logs.stdout.push(text),
                ExecutionEvent::Stderr { text } => result.logs.stderr.push(text),
                ExecutionEvent::Result(item) => result.results.push(item),
                ExecutionEvent::Error {
                    name,
                    value,
                    traceback,
                } => {
                    result.error = Some(ExecutionError {
                        name,
                        value,
                        traceback,
                    })
                }
                ExecutionEvent::NumberOfExecutions { execution_count } => {
                    tracing::debug!(execution_count, "Execution count");
                }
                ExecutionEvent::EndOfExecution => break,
                ExecutionEvent::Unknown => {
                    tracing::debug!(line = %line, "Unknown execution event");
                }
            }
        }

        return Ok(result);
    }

    async fn destroy(&self, handle: &SandboxHandle, api_key: &str) -> Result<(), SandboxError> {
        let res = reqwest::Client::new()
            .delete(format!(
                "{url}/sandboxes/{id}",
                url = self.api_url,
                id = handle.sandbox_id
            ))
            .header("X-API-KEY", api_key)
            .send()
            .await
            .map_err(|err| return SandboxError::upstream("Failed to destroy sandbox", err))?;

        // Already gone counts as destroyed.
        if !res.status().is_success() && res.status() != 404 {
            return Err(SandboxError::upstream(
                "Failed to destroy sandbox",
                format!("status {}", res.status().as_u16()),
            ));
        }

        tracing::debug!(sandbox_id = %handle.sandbox_id, "Destroyed sandbox");
        return Ok(());
    }
}

#[async_trait]
impl Sandbox for E2B {
    #[allow(clippy::implicit_return)]
    async fn execute(
        &self,
        api_key: Option<&str>,
        code: &str,
    ) -> Result<ExecutionResult, SandboxError> {
        let api_key = match api_key {
            Some(key) if !key.trim().is_empty() => key,
            _ => return Err(SandboxError::MissingCredential),
        };

        let handle = self.create(api_key).await?;
        let res = self.run(&handle, code).await;

        if let Err(err) = self.destroy(&handle, api_key).await {
            tracing::error!(
                sandbox_id = %handle.sandbox_id,
                error = %err,
                "Failed to destroy sandbox"
            );
        }

        return res;
    }
}
