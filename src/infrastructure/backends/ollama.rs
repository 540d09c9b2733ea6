#[cfg(test)]
#[path = "ollama_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::validate_request;
use crate::domain::models::Backend;
use crate::domain::models::ChatError;
use crate::domain::models::ChatRequest;
use crate::domain::models::ChatResponse;
use crate::domain::models::FragmentHandler;

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Model {
    name: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ModelListResponse {
    #[serde(default)]
    pub models: Vec<Model>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

pub struct Ollama {
    url: String,
    timeout: u64,
}

impl Ollama {
    pub fn new(config: &Config) -> Result<Ollama> {
        return Ok(Ollama {
            url: config.get(ConfigKey::OllamaURL),
            timeout: config.parse::<u64>(ConfigKey::BackendHealthCheckTimeout)?,
        });
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, ChatError> {
        let res = reqwest::Client::new()
            .post(format!("{url}/api/chat", url = self.url))
            .json(request)
            .send()
            .await
            .map_err(|err| return ChatError::generation("Ollama is unreachable", err))?;

        if !res.status().is_success() {
            let status = res.status();
            tracing::error!(
                status = status.as_u16(),
                "Failed to make chat request to Ollama"
            );
            let body = res.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => err.error,
                Err(_) => status.to_string(),
            };
            return Err(ChatError::generation(
                &format!("Ollama API error ({})", status.as_u16()),
                reason,
            ));
        }

        return Ok(res);
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        let res = self.send(request).await?;
        let body = res
            .json::<ChatResponse>()
            .await
            .map_err(|err| return ChatError::generation("Invalid response from Ollama", err))?;
        tracing::debug!(body = ?body, "Chat response");

        return Ok(body.message.content);
    }

    async fn complete_streaming(
        &self,
        request: &ChatRequest,
        on_fragment: &mut FragmentHandler<'_>,
    ) -> Result<String, ChatError> {
        let res = self.send(request).await?;
        let stream = res.bytes_stream().map_err(convert_err);
        let mut reader = StreamReader::new(stream);

        let mut full_response = String::new();
        let mut fragments = 0;
        let mut raw: Vec<u8> = vec![];
        let mut line: Vec<u8> = vec![];

        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .await
                .map_err(|err| return ChatError::generation("Ollama stream interrupted", err))?;
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&line);

            let text = String::from_utf8_lossy(&line);
            if text.trim().is_empty() {
                continue;
            }

            if let Ok(ores) = serde_json::from_str::<ChatResponse>(&text) {
                tracing::debug!(body = ?ores, "Chat fragment");
                on_fragment(&ores.message.content);
                full_response += &ores.message.content;
                fragments += 1;
                continue;
            }

            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&text) {
                return Err(ChatError::generation("Ollama stream error", err.error));
            }

            tracing::debug!(line = %text, "Skipping line that is not a chat fragment");
        }

        if fragments > 0 {
            return Ok(full_response);
        }

        // Nothing arrived in fragments. Treat the payload as one unit.
        if let Ok(ores) = serde_json::from_slice::<ChatResponse>(&raw) {
            tracing::warn!("Streaming returned no fragments, parsed the payload as one response");
            return Ok(ores.message.content);
        }

        tracing::warn!("Streaming returned no fragments, using the raw payload");
        return match String::from_utf8(raw) {
            Ok(text) => Ok(text),
            Err(err) => {
                tracing::warn!("Raw payload is not valid UTF-8");
                return Ok(String::from_utf8_lossy(err.as_bytes()).to_string());
            }
        };
    }
}

#[async_trait]
impl Backend for Ollama {
    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        let res = reqwest::Client::new()
            .get(&self.url)
            .timeout(Duration::from_millis(self.timeout))
            .send()
            .await;

        if let Err(err) = res {
            tracing::error!(error = ?err, "Ollama is not running");
            bail!("Ollama is not running at {}", self.url);
        }

        let res = res?;
        if res.status() != 200 {
            tracing::error!(status = res.status().as_u16(), "Ollama health check failed");
            bail!("Ollama health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn list_models(&self) -> Result<Vec<String>> {
        let res = reqwest::Client::new()
            .get(format!("{url}/api/tags", url = self.url))
            .send()
            .await?;

        if !res.status().is_success() {
            bail!("Failed to fetch models: {}", res.status());
        }

        let mut models: Vec<String> = res
            .json::<ModelListResponse>()
            .await?
            .models
            .iter()
            .map(|model| {
                return model.name.to_string();
            })
            .collect();

        models.sort();

        return Ok(models);
    }

    #[allow(clippy::implicit_return)]
    async fn get_completion<'a>(
        &self,
        request: &ChatRequest,
        on_fragment: &mut FragmentHandler<'a>,
    ) -> Result<String, ChatError> {
        validate_request(request)?;

        if request.stream {
            return self.complete_streaming(request, on_fragment).await;
        }

        return self.complete(request).await;
    }
}
