#[cfg(test)]
#[path = "commands_test.rs"]
mod tests;

use std::io;
use std::io::Write;
use std::path;

use anyhow::bail;
use anyhow::Result;
use tokio::fs;
use yansi::Paint;

use super::prompts;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::is_valid_api_key;
use crate::domain::models::mask_secret;
use crate::domain::models::Backend;
use crate::domain::models::CredentialStore;
use crate::domain::models::ExecutionResult;
use crate::domain::models::SANDBOX_API_KEY;
use crate::domain::services::Artifacts;
use crate::domain::services::GenerateRequest;
use crate::domain::services::Pipeline;
use crate::domain::services::PipelineError;
use crate::domain::services::Progress;
use crate::domain::services::RunReport;
use crate::infrastructure::backends::ollama::Ollama;
use crate::infrastructure::credentials::file::FileCredentialStore;
use crate::infrastructure::openers::OpenerManager;
use crate::infrastructure::sandboxes::e2b::E2B;

/// Offered when the model listing is unavailable.
pub const DEFAULT_MODELS: [&str; 4] = ["gemma3:27b", "llama3:8b", "mistral:7b", "phi3:14b"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

pub struct GenerateOptions {
    pub prompt: Option<String>,
    pub select_model: bool,
    pub stream: bool,
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let artifacts = Artifacts::new(config.output_dir()?, config.file_naming()?);

    let pipeline = Pipeline::new(
        Box::new(Ollama::new(config)?),
        Box::new(E2B::new(config)?),
        Box::new(FileCredentialStore::from_config(config)),
        artifacts,
        OpenerManager::get(config.opener()?)?,
    )
    .with_api_key_override(config.get_opt(ConfigKey::SandboxApiKey));

    return Ok(pipeline);
}

/// Models to offer and the index of the configured one.
pub fn model_choices(available: Vec<String>, configured: &str) -> (Vec<String>, usize) {
    let mut models = available;
    if models.is_empty() {
        models = DEFAULT_MODELS
            .iter()
            .map(|model| return model.to_string())
            .collect();
    }

    let default = models
        .iter()
        .position(|model| return model == configured)
        .unwrap_or(0);

    return (models, default);
}

async fn choose_model(pipeline: &Pipeline, configured: &str) -> Result<Option<String>> {
    let available = match pipeline.backend().list_models().await {
        Ok(models) => models,
        Err(err) => {
            tracing::warn!(error = ?err, "Failed to list models, using defaults");
            println!(
                "{}",
                Paint::yellow("Could not list models from Ollama. Showing the default list.")
            );
            vec![]
        }
    };

    let (models, default) = model_choices(available, configured);
    let idx = prompts::select("Which model should generate the code?", &models, default)?;

    return Ok(idx.map(|idx| return models[idx].to_string()));
}

fn print_progress(progress: Progress<'_>, stream: bool) {
    match progress {
        Progress::Generating { model } => {
            println!("Generating code with {}...", Paint::cyan(model));
        }
        Progress::Fragment(fragment) => {
            print!("{fragment}");
            let _ = io::stdout().flush();
        }
        Progress::Generated => {
            if stream {
                println!();
            }
        }
        Progress::Extracted { count } => {
            println!("Found {count} code block(s).");
        }
        Progress::Executing => {
            println!("Executing code in the E2B sandbox...");
        }
        Progress::Executed { result } => {
            print_execution(result);
        }
        Progress::Saved { .. } => {}
    }
}

/// One line of sandbox output as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Stdout(String),
    Stderr(String),
    Error(String),
}

pub fn execution_log_lines(result: &ExecutionResult) -> Vec<LogLine> {
    let mut lines = vec![];
    for chunk in &result.logs.stdout {
        lines.extend(chunk.lines().map(|line| return LogLine::Stdout(line.to_string())));
    }
    for chunk in &result.logs.stderr {
        lines.extend(chunk.lines().map(|line| return LogLine::Stderr(line.to_string())));
    }

    if let Some(err) = &result.error {
        lines.push(LogLine::Error(format!("{}: {}", err.name, err.value)));
        lines.extend(
            err.traceback
                .lines()
                .map(|line| return LogLine::Error(line.to_string())),
        );
    }

    return lines;
}

fn print_execution(result: &ExecutionResult) {
    let lines = execution_log_lines(result);
    if lines.is_empty() {
        return;
    }

    println!("\n\tLogs:");
    for line in lines {
        match line {
            LogLine::Stdout(text) => println!("\t{text}"),
            LogLine::Stderr(text) => println!("\t{}", Paint::yellow(text)),
            LogLine::Error(text) => println!("\t{}", Paint::red(text)),
        }
    }
    println!();
}

fn print_report(report: &RunReport) {
    for file_path in &report.saved.sources {
        println!("Saved code to {}", Paint::green(file_path.display()));
    }

    match &report.saved.image {
        Some(file_path) => println!("Saved graph to {}", Paint::green(file_path.display())),
        None => println!("{}", Paint::yellow("No graph image was generated.")),
    }
}

/// Makes sure a sandbox key is available, offering to store one when it is
/// missing.
async fn ensure_credential(pipeline: &Pipeline, config: &Config) -> Result<Outcome> {
    if pipeline.api_key().await?.is_some() {
        return Ok(Outcome::Completed);
    }

    println!("{}", Paint::yellow(PipelineError::MissingCredential.to_string()));
    return match prompts::confirm("Set your E2B API key now?", true)? {
        Some(true) => credentials_set(config).await,
        Some(false) => Err(PipelineError::MissingCredential.into()),
        None => Ok(Outcome::Cancelled),
    };
}

pub async fn generate(config: &Config, options: GenerateOptions) -> Result<Outcome> {
    let pipeline = build_pipeline(config)?;

    if ensure_credential(&pipeline, config).await? == Outcome::Cancelled {
        return Ok(Outcome::Cancelled);
    }

    pipeline.backend().health_check().await?;

    let prompt = match options.prompt {
        Some(prompt) if !prompt.trim().is_empty() => prompt.trim().to_string(),
        _ => match prompts::graph_description()? {
            Some(prompt) => prompt,
            None => return Ok(Outcome::Cancelled),
        },
    };

    let mut model = config.get(ConfigKey::Model);
    if options.select_model {
        model = match choose_model(&pipeline, &model).await? {
            Some(model) => model,
            None => return Ok(Outcome::Cancelled),
        };
    }

    let request = GenerateRequest {
        prompt,
        model,
        max_tokens: config.max_tokens()?,
        stream: options.stream,
    };

    let stream = options.stream;
    let report = pipeline
        .generate(&request, &mut |progress: Progress<'_>| {
            print_progress(progress, stream);
        })
        .await?;
    print_report(&report);

    return Ok(Outcome::Completed);
}

/// Python files directly under `dir`, sorted by name.
pub async fn list_python_files(dir: &path::Path) -> Result<Vec<path::PathBuf>> {
    let mut files = vec![];
    if !dir.exists() {
        return Ok(files);
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_path = entry.path();
        if file_path.is_file() && file_path.extension().map_or(false, |ext| return ext == "py") {
            files.push(file_path);
        }
    }

    files.sort();
    return Ok(files);
}

pub async fn exec(config: &Config, file: Option<path::PathBuf>) -> Result<Outcome> {
    let pipeline = build_pipeline(config)?;

    let file_path = match file {
        Some(file_path) => file_path,
        None => {
            let output_dir = pipeline.artifacts().output_dir().to_path_buf();
            let files = list_python_files(&output_dir).await?;
            if files.is_empty() {
                bail!("No Python files found in {}", output_dir.display());
            }

            let names = files
                .iter()
                .map(|file_path| return file_path.display().to_string())
                .collect::<Vec<String>>();
            match prompts::select("Which file should be executed?", &names, 0)? {
                Some(idx) => files[idx].to_path_buf(),
                None => return Ok(Outcome::Cancelled),
            }
        }
    };

    if ensure_credential(&pipeline, config).await? == Outcome::Cancelled {
        return Ok(Outcome::Cancelled);
    }

    println!("Executing {}...", file_path.display());
    let report = pipeline
        .execute_file(&file_path, &mut |progress: Progress<'_>| {
            print_progress(progress, false);
        })
        .await?;
    print_report(&report);

    return Ok(Outcome::Completed);
}

pub async fn credentials_set(config: &Config) -> Result<Outcome> {
    let api_key = match prompts::secret("Enter your E2B API key")? {
        Some(api_key) => api_key,
        None => return Ok(Outcome::Cancelled),
    };

    if !is_valid_api_key(&api_key) {
        bail!("Invalid API key format");
    }

    FileCredentialStore::from_config(config)
        .set(SANDBOX_API_KEY, api_key.trim())
        .await?;
    println!("{}", Paint::green("E2B API key saved."));

    return Ok(Outcome::Completed);
}

pub async fn credentials_delete(config: &Config) -> Result<Outcome> {
    let store = FileCredentialStore::from_config(config);
    if store.get(SANDBOX_API_KEY).await?.is_none() {
        println!("No E2B API key is stored.");
        return Ok(Outcome::Completed);
    }

    if prompts::confirm("Delete the stored E2B API key?", false)? != Some(true) {
        return Ok(Outcome::Cancelled);
    }

    store.delete(SANDBOX_API_KEY).await?;
    println!("{}", Paint::green("E2B API key deleted."));

    return Ok(Outcome::Completed);
}

pub async fn credentials_show(config: &Config) -> Result<()> {
    let stored = FileCredentialStore::from_config(config)
        .get(SANDBOX_API_KEY)
        .await?;

    match stored {
        Some(api_key) => println!("E2B API key: {}", mask_secret(&api_key)),
        None => println!("No E2B API key is stored."),
    }

    if config.get_opt(ConfigKey::SandboxApiKey).is_some() {
        println!("An API key from E2B_API_KEY or the config file takes precedence.");
    }

    return Ok(());
}

pub async fn models(config: &Config) -> Result<()> {
    let models = Ollama::new(config)?.list_models().await?;
    if models.is_empty() {
        println!("No models are available. Pull one with `ollama pull`.");
        return Ok(());
    }

    println!("{}", models.join("\n"));
    return Ok(());
}
