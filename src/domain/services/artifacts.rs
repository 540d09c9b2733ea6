#[cfg(test)]
#[path = "artifacts_test.rs"]
mod tests;

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use chrono::Local;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::annotator::annotate;
use super::annotator::Provenance;
use crate::domain::models::CodeBlock;
use crate::domain::models::ExecutionResult;
use crate::domain::models::OpenerBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FileNaming {
    /// `graph_code_<YYYYMMDD-HHMMSS>.py`, safe to run repeatedly into one directory.
    Timestamp,
    /// `graph_code.py`, overwritten on every run.
    Fixed,
}

impl FileNaming {
    pub fn parse(text: String) -> Option<FileNaming> {
        return FileNaming::iter().find(|e| return e.to_string() == text);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SavedArtifacts {
    pub sources: Vec<PathBuf>,
    pub image: Option<PathBuf>,
}

impl SavedArtifacts {
    pub fn all(&self) -> Vec<&PathBuf> {
        return self.sources.iter().chain(self.image.iter()).collect();
    }
}

pub fn timestamp() -> String {
    return Local::now().format("%Y%m%d-%H%M%S").to_string();
}

/// Writes annotated sources and the rendered graph to the output directory.
pub struct Artifacts {
    output_dir: PathBuf,
    naming: FileNaming,
}

impl Artifacts {
    pub fn new(output_dir: PathBuf, naming: FileNaming) -> Artifacts {
        return Artifacts { output_dir, naming };
    }

    pub fn output_dir(&self) -> &Path {
        return &self.output_dir;
    }

    pub fn source_file_name(&self, index: usize, total: usize, timestamp: &str) -> String {
        let position = if total > 1 {
            format!("_{}", index + 1)
        } else {
            "".to_string()
        };

        return match self.naming {
            FileNaming::Timestamp => format!("graph_code{position}_{timestamp}.py"),
            FileNaming::Fixed => format!("graph_code{position}.py"),
        };
    }

    pub fn image_file_name(&self, timestamp: &str) -> String {
        return match self.naming {
            FileNaming::Timestamp => format!("graph_{timestamp}.png"),
            FileNaming::Fixed => "graph.png".to_string(),
        };
    }

    async fn write_file(&self, file_name: &str, payload: &[u8]) -> Result<PathBuf> {
        let file_path = self.output_dir.join(file_name);
        let mut file = fs::File::create(&file_path)
            .await
            .with_context(|| return format!("Failed to create {}", file_path.display()))?;
        file.write_all(payload).await?;
        file.flush().await?;

        return Ok(file_path);
    }

    /// Writes one annotated file per block, then the first result's image if
    /// there is one. Files already written stay on disk when a later write
    /// fails.
    pub async fn save(
        &self,
        blocks: &[CodeBlock],
        provenance: &Provenance,
        result: &ExecutionResult,
    ) -> Result<SavedArtifacts> {
        if !self.output_dir.exists() {
            fs::create_dir_all(&self.output_dir).await.with_context(|| {
                return format!(
                    "Failed to create output directory {}",
                    self.output_dir.display()
                );
            })?;
        }

        let timestamp = timestamp();
        let mut saved = SavedArtifacts::default();

        for (idx, block) in blocks.iter().enumerate() {
            let file_name = self.source_file_name(idx, blocks.len(), &timestamp);
            let annotated = annotate(&block.code, &block.language, provenance, idx, blocks.len());
            let file_path = self.write_file(&file_name, annotated.as_bytes()).await?;
            tracing::debug!(path = ?file_path, "Saved code block");
            saved.sources.push(file_path);
        }

        if let Some(png) = result.first_image() {
            let image = b64.decode(png.trim()).with_context(|| {
                return format!(
                    "Saved {} code file(s) but the graph image is not valid base64",
                    saved.sources.len()
                );
            })?;

            let file_path = self
                .write_file(&self.image_file_name(&timestamp), &image)
                .await
                .with_context(|| {
                    return format!(
                        "Saved {} code file(s) but failed to write the graph image",
                        saved.sources.len()
                    );
                })?;
            tracing::debug!(path = ?file_path, bytes = image.len(), "Saved graph image");
            saved.image = Some(file_path);
        }

        return Ok(saved);
    }

    /// Opens every saved artifact. Failing to open is logged and otherwise
    /// ignored.
    pub async fn present(&self, saved: &SavedArtifacts, opener: &OpenerBox) {
        for file_path in saved.all() {
            if let Err(err) = opener.open(file_path).await {
                tracing::warn!(
                    path = ?file_path,
                    opener = %opener.name(),
                    error = ?err,
                    "Failed to open artifact"
                );
            }
        }
    }
}
