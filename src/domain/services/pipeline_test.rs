use std::path::Path;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use mockito::Matcher;
use tempfile::TempDir;
use test_utils::fixture_path;
use test_utils::png_base64_fixture;
use test_utils::python_response_fixture;

use super::GenerateRequest;
use super::Pipeline;
use super::PipelineError;
use super::Progress;
use super::DEFAULT_PROMPT;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ChatResponse;
use crate::domain::models::ChatResponseMessage;
use crate::domain::models::CredentialStore;
use crate::domain::models::SANDBOX_API_KEY;
use crate::domain::services::Artifacts;
use crate::domain::services::FileNaming;
use crate::infrastructure::backends::ollama::Ollama;
use crate::infrastructure::credentials::file::FileCredentialStore;
use crate::infrastructure::openers::noop::NoopOpener;
use crate::infrastructure::sandboxes::e2b::E2B;

const EXPECTED_CODE: &str = r#"import matplotlib.pyplot as plt

months = ["Jan", "Feb", "Mar"]
sales = [120, 95, 143]

plt.bar(months, sales)
plt.title("Monthly Sales 2023")
plt.show()"#;

fn config(url: &str) -> Config {
    let mut config = Config::default();
    config.set(ConfigKey::OllamaURL, url);
    config.set(ConfigKey::SandboxApiURL, url);
    config.set(ConfigKey::SandboxExecutionURL, url);
    config.set(ConfigKey::SandboxTimeout, "30");
    return config;
}

async fn pipeline(url: &str, dir: &Path, api_key: Option<&str>) -> Result<Pipeline> {
    let config = config(url);
    let credentials = FileCredentialStore::new(dir.join("credentials.json"));
    if let Some(api_key) = api_key {
        credentials.set(SANDBOX_API_KEY, api_key).await?;
    }

    return Ok(Pipeline::new(
        Box::new(Ollama::new(&config)?),
        Box::new(E2B::new(&config)?),
        Box::new(credentials),
        Artifacts::new(dir.join("graphs"), FileNaming::Fixed),
        Box::<NoopOpener>::default(),
    ));
}

fn request(stream: bool) -> GenerateRequest {
    return GenerateRequest {
        prompt: DEFAULT_PROMPT.to_string(),
        model: "gemma3:27b".to_string(),
        max_tokens: Some(4096),
        stream,
    };
}

fn chat_body(content: &str) -> Result<String> {
    return chat_line(content, true);
}

fn chat_line(content: &str, done: bool) -> Result<String> {
    return Ok(serde_json::to_string(&ChatResponse {
        message: ChatResponseMessage {
            content: content.to_string(),
        },
        done,
    })?);
}

fn describe(progress: &Progress<'_>) -> String {
    return match progress {
        Progress::Generating { model } => format!("generating {model}"),
        Progress::Fragment(_) => "fragment".to_string(),
        Progress::Generated => "generated".to_string(),
        Progress::Extracted { count } => format!("extracted {count}"),
        Progress::Executing => "executing".to_string(),
        Progress::Executed { result } => format!("executed {}", result.results.len()),
        Progress::Saved { saved } => format!("saved {}", saved.all().len()),
    };
}

#[tokio::test]
async fn it_requires_a_credential_before_generating() -> Result<()> {
    let dir = TempDir::new()?;
    let mut server = mockito::Server::new_async().await;
    let chat_mock = server
        .mock("POST", "/api/chat")
        .expect(0)
        .create_async()
        .await;

    let pipeline = pipeline(&server.url(), dir.path(), None).await?;
    let err = pipeline
        .generate(&request(false), &mut |_progress: Progress<'_>| {})
        .await
        .unwrap_err();

    chat_mock.assert_async().await;
    assert!(matches!(err, PipelineError::MissingCredential));
    assert!(!dir.path().join("graphs").exists());
    insta::assert_snapshot!(err.to_string(), @"E2B Sandbox API key not found. Set your API key with `graphgen credentials set` to continue.");

    return Ok(());
}

#[tokio::test]
async fn it_fails_when_the_response_has_no_code() -> Result<()> {
    let dir = TempDir::new()?;
    let mut server = mockito::Server::new_async().await;
    let chat_mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(chat_body("I can only describe charts in prose.")?)
        .create_async()
        .await;
    let sandbox_mock = server
        .mock("POST", "/sandboxes")
        .expect(0)
        .create_async()
        .await;

    let pipeline = pipeline(&server.url(), dir.path(), Some("e2b_key")).await?;
    let err = pipeline
        .generate(&request(false), &mut |_progress: Progress<'_>| {})
        .await
        .unwrap_err();

    chat_mock.assert_async().await;
    sandbox_mock.assert_async().await;
    assert!(matches!(err, PipelineError::NoCodeBlocks));
    assert!(!dir.path().join("graphs").exists());

    return Ok(());
}

#[tokio::test]
async fn it_generates_executes_and_saves_a_graph() -> Result<()> {
    let dir = TempDir::new()?;
    let mut server = mockito::Server::new_async().await;
    let chat_mock = server
        .mock("POST", "/api/chat")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "gemma3:27b",
            "stream": false,
            "max_tokens": 4096,
        })))
        .with_status(200)
        .with_body(chat_body(python_response_fixture())?)
        .create_async()
        .await;
    let create_mock = server
        .mock("POST", "/sandboxes")
        .match_header("X-API-KEY", "e2b_key")
        .with_status(201)
        .with_body(r#"{"sandboxID":"sbx1","envdAccessToken":"tok"}"#)
        .create_async()
        .await;
    let execute_mock = server
        .mock("POST", "/execute")
        .match_body(Matcher::PartialJson(
            serde_json::json!({ "code": EXPECTED_CODE }),
        ))
        .with_status(200)
        .with_body(format!(
            "{{\"type\":\"result\",\"png\":\"{}\"}}\n{{\"type\":\"end_of_execution\"}}",
            png_base64_fixture()
        ))
        .create_async()
        .await;
    let destroy_mock = server
        .mock("DELETE", "/sandboxes/sbx1")
        .with_status(204)
        .create_async()
        .await;

    let pipeline = pipeline(&server.url(), dir.path(), Some("e2b_key")).await?;
    let mut events: Vec<String> = vec![];
    let report = pipeline
        .generate(&request(false), &mut |progress: Progress<'_>| {
            events.push(describe(&progress));
        })
        .await?;

    chat_mock.assert_async().await;
    create_mock.assert_async().await;
    execute_mock.assert_async().await;
    destroy_mock.assert_async().await;

    assert_eq!(
        events,
        vec![
            "generating gemma3:27b",
            "generated",
            "extracted 1",
            "executing",
            "executed 1",
            "saved 2",
        ]
    );

    let graphs = dir.path().join("graphs");
    assert_eq!(report.saved.sources, vec![graphs.join("graph_code.py")]);
    assert_eq!(report.saved.image, Some(graphs.join("graph.png")));

    let source = std::fs::read_to_string(graphs.join("graph_code.py"))?;
    insta::assert_snapshot!(source, @r###"
    # ================================================================================
    # USER PROMPT:
    # A bar chart showing monthly sales data for 2023
    #
    # MODEL: gemma3:27b
    # ================================================================================

    import matplotlib.pyplot as plt

    months = ["Jan", "Feb", "Mar"]
    sales = [120, 95, 143]

    plt.bar(months, sales)
    plt.title("Monthly Sales 2023")
    plt.show()
    "###);

    let image = std::fs::read(graphs.join("graph.png"))?;
    assert_eq!(image, b64.decode(png_base64_fixture())?);

    return Ok(());
}

#[tokio::test]
async fn it_forwards_streamed_fragments_before_finishing() -> Result<()> {
    let chunks = python_response_fixture()
        .split_inclusive("```")
        .collect::<Vec<&str>>();
    assert_eq!(chunks.len(), 3);
    let body = chunks
        .iter()
        .enumerate()
        .map(|(idx, chunk)| return chat_line(chunk, idx == chunks.len() - 1))
        .collect::<Result<Vec<String>>>()?
        .join("\n");

    let dir = TempDir::new()?;
    let mut server = mockito::Server::new_async().await;
    let chat_mock = server
        .mock("POST", "/api/chat")
        .match_body(Matcher::PartialJson(serde_json::json!({ "stream": true })))
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;
    server
        .mock("POST", "/sandboxes")
        .with_status(201)
        .with_body(r#"{"sandboxID":"sbx5"}"#)
        .create_async()
        .await;
    let execute_mock = server
        .mock("POST", "/execute")
        .match_body(Matcher::PartialJson(
            serde_json::json!({ "code": EXPECTED_CODE }),
        ))
        .with_status(200)
        .with_body(format!(
            "{{\"type\":\"result\",\"png\":\"{}\"}}",
            png_base64_fixture()
        ))
        .create_async()
        .await;
    server
        .mock("DELETE", "/sandboxes/sbx5")
        .with_status(204)
        .create_async()
        .await;

    let pipeline = pipeline(&server.url(), dir.path(), Some("e2b_key")).await?;
    let mut events: Vec<String> = vec![];
    let mut fragments: Vec<String> = vec![];
    pipeline
        .generate(&request(true), &mut |progress: Progress<'_>| {
            if let Progress::Fragment(fragment) = &progress {
                fragments.push(fragment.to_string());
            }
            events.push(describe(&progress));
        })
        .await?;

    chat_mock.assert_async().await;
    execute_mock.assert_async().await;
    assert_eq!(fragments.concat(), python_response_fixture());
    assert_eq!(
        events,
        vec![
            "generating gemma3:27b",
            "fragment",
            "fragment",
            "fragment",
            "generated",
            "extracted 1",
            "executing",
            "executed 1",
            "saved 2",
        ]
    );

    return Ok(());
}

#[tokio::test]
async fn it_prefers_the_api_key_override() -> Result<()> {
    let dir = TempDir::new()?;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_body(chat_body(python_response_fixture())?)
        .create_async()
        .await;
    let create_mock = server
        .mock("POST", "/sandboxes")
        .match_header("X-API-KEY", "env_key")
        .with_status(201)
        .with_body(r#"{"sandboxID":"sbx2"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/execute")
        .with_status(200)
        .with_body(r#"{"type":"stdout","text":"no figure"}"#)
        .create_async()
        .await;
    server
        .mock("DELETE", "/sandboxes/sbx2")
        .with_status(204)
        .create_async()
        .await;

    let pipeline = pipeline(&server.url(), dir.path(), Some("stored_key"))
        .await?
        .with_api_key_override(Some("env_key".to_string()));
    let report = pipeline
        .generate(&request(false), &mut |_progress: Progress<'_>| {})
        .await?;

    create_mock.assert_async().await;
    assert_eq!(report.execution.logs.stdout, vec!["no figure".to_string()]);
    assert_eq!(report.saved.sources.len(), 1);
    assert!(report.saved.image.is_none());

    return Ok(());
}

#[tokio::test]
async fn it_executes_an_annotated_file() -> Result<()> {
    let dir = TempDir::new()?;
    let source = std::fs::read_to_string(fixture_path("annotated.py"))?;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/sandboxes")
        .with_status(201)
        .with_body(r#"{"sandboxID":"sbx3"}"#)
        .create_async()
        .await;
    let execute_mock = server
        .mock("POST", "/execute")
        .match_body(Matcher::PartialJson(
            serde_json::json!({ "code": source }),
        ))
        .with_status(200)
        .with_body(format!(
            "{{\"type\":\"result\",\"png\":\"{}\"}}",
            png_base64_fixture()
        ))
        .create_async()
        .await;
    server
        .mock("DELETE", "/sandboxes/sbx3")
        .with_status(204)
        .create_async()
        .await;

    let pipeline = pipeline(&server.url(), dir.path(), Some("e2b_key")).await?;
    let report = pipeline
        .execute_file(&fixture_path("annotated.py"), &mut |_progress: Progress<'_>| {})
        .await?;

    execute_mock.assert_async().await;
    let saved = std::fs::read_to_string(&report.saved.sources[0])?;
    assert_eq!(saved, source);
    assert!(report.saved.image.is_some());

    return Ok(());
}

#[tokio::test]
async fn it_annotates_unannotated_files_with_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let file_path = dir.path().join("plot.py");
    std::fs::write(&file_path, "print('hello')\n")?;

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/sandboxes")
        .with_status(201)
        .with_body(r#"{"sandboxID":"sbx4"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/execute")
        .with_status(200)
        .with_body(r#"{"type":"stdout","text":"hello\n"}"#)
        .create_async()
        .await;
    server
        .mock("DELETE", "/sandboxes/sbx4")
        .with_status(204)
        .create_async()
        .await;

    let pipeline = pipeline(&server.url(), dir.path(), Some("e2b_key")).await?;
    let report = pipeline
        .execute_file(&file_path, &mut |_progress: Progress<'_>| {})
        .await?;

    let saved = std::fs::read_to_string(&report.saved.sources[0])?;
    insta::assert_snapshot!(saved, @r###"
    # ================================================================================
    # USER PROMPT:
    # Executed Python code
    #
    # MODEL: N/A
    # ================================================================================

    print('hello')
    "###);

    return Ok(());
}

#[tokio::test]
async fn it_fails_for_missing_files() -> Result<()> {
    let dir = TempDir::new()?;
    let pipeline = pipeline("http://127.0.0.1:1", dir.path(), Some("e2b_key")).await?;
    let err = pipeline
        .execute_file(&dir.path().join("missing.py"), &mut |_progress: Progress<'_>| {})
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Io(_)));
    assert!(err.to_string().starts_with("Failed to read"));

    return Ok(());
}
