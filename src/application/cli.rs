#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::parser::ValueSource;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::commands;
use super::commands::GenerateOptions;
use super::commands::Outcome;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::OpenerName;
use crate::domain::services::FileNaming;
use crate::domain::services::DEFAULT_PROMPT;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default_value(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_credentials() -> Command {
    return Command::new("credentials")
        .about("Manage the E2B sandbox API key.")
        .arg_required_else_help(true)
        .subcommand(Command::new("set").about("Create or update the stored API key."))
        .subcommand(Command::new("delete").about("Delete the stored API key."))
        .subcommand(Command::new("show").about("Show whether an API key is stored, masked."));
}

fn arg_prompt() -> Arg {
    return Arg::new("prompt")
        .short('p')
        .long("prompt")
        .num_args(1)
        .help(format!("Description of the graph to generate. Asked for interactively when omitted. [default: {DEFAULT_PROMPT}]"));
}

fn arg_select_model() -> Arg {
    return Arg::new("select-model")
        .long("select-model")
        .action(ArgAction::SetTrue)
        .help("Pick the model from the ones available in Ollama, even when --model is given.");
}

fn arg_stream() -> Arg {
    return Arg::new("stream")
        .long("stream")
        .action(ArgAction::SetTrue)
        .help("Print the response as it is generated.");
}

fn subcommand_generate() -> Command {
    return Command::new("generate")
        .about("Generate, execute and save a graph from a description.")
        .arg(arg_prompt())
        .arg(arg_select_model())
        .arg(arg_stream());
}

fn subcommand_exec() -> Command {
    return Command::new("exec")
        .about("Execute an existing Python file and save its graph. Omit the file to pick one from the output directory.")
        .arg(
            Arg::new("file")
                .help("Path to the Python file.")
                .value_parser(value_parser!(path::PathBuf))
                .required(false),
        );
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    return Command::new("graphgen")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(false)
        .subcommand(subcommand_generate())
        .subcommand(subcommand_exec())
        .subcommand(subcommand_credentials())
        .subcommand(Command::new("models").about("List the models available in Ollama."))
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(Command::new("manpages").about("Generates manpages and outputs to stdout."))
        .arg(arg_prompt())
        .arg(arg_select_model())
        .arg(arg_stream())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("GRAPHGEN_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default_value(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(
            Arg::new(ConfigKey::Model.to_string())
                .short('m')
                .long(ConfigKey::Model.to_string())
                .env("GRAPHGEN_MODEL")
                .num_args(1)
                .help(format!("The Ollama model that generates the code. [default: {}]", Config::default_value(ConfigKey::Model)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::OllamaURL.to_string())
                .long(ConfigKey::OllamaURL.to_string())
                .env("GRAPHGEN_OLLAMA_URL")
                .num_args(1)
                .help(format!("Ollama API URL. [default: {}]", Config::default_value(ConfigKey::OllamaURL)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::BackendHealthCheckTimeout.to_string())
                .long(ConfigKey::BackendHealthCheckTimeout.to_string())
                .env("GRAPHGEN_BACKEND_HEALTH_CHECK_TIMEOUT")
                .num_args(1)
                .help(format!("Time to wait in milliseconds before timing out when doing a healthcheck for Ollama. [default: {}]", Config::default_value(ConfigKey::BackendHealthCheckTimeout)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::MaxTokens.to_string())
                .long(ConfigKey::MaxTokens.to_string())
                .env("GRAPHGEN_MAX_TOKENS")
                .num_args(1)
                .help(format!("Upper bound on tokens generated per request. [default: {}]", Config::default_value(ConfigKey::MaxTokens)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::OutputDir.to_string())
                .short('o')
                .long(ConfigKey::OutputDir.to_string())
                .env("GRAPHGEN_OUTPUT_DIR")
                .num_args(1)
                .help("Directory generated code and graphs are saved to, relative to the current directory. Defaults to the current directory.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::FileNaming.to_string())
                .long(ConfigKey::FileNaming.to_string())
                .env("GRAPHGEN_FILE_NAMING")
                .num_args(1)
                .help(format!("How saved files are named. [default: {}]", Config::default_value(ConfigKey::FileNaming)))
                .value_parser(PossibleValuesParser::new(FileNaming::VARIANTS))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::Opener.to_string())
                .long(ConfigKey::Opener.to_string())
                .env("GRAPHGEN_OPENER")
                .num_args(1)
                .help(format!("How saved files are opened once written. [default: {}]", Config::default_value(ConfigKey::Opener)))
                .value_parser(PossibleValuesParser::new(OpenerName::VARIANTS))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::CredentialsFile.to_string())
                .long(ConfigKey::CredentialsFile.to_string())
                .env("GRAPHGEN_CREDENTIALS_FILE")
                .num_args(1)
                .help(format!("Path to the file the E2B API key is stored in. [default: {}]", Config::default_value(ConfigKey::CredentialsFile)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::SandboxApiKey.to_string())
                .long(ConfigKey::SandboxApiKey.to_string())
                .env("E2B_API_KEY")
                .hide_env_values(true)
                .num_args(1)
                .help("E2B API key. Takes precedence over the stored key.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::SandboxApiURL.to_string())
                .long(ConfigKey::SandboxApiURL.to_string())
                .env("GRAPHGEN_SANDBOX_API_URL")
                .num_args(1)
                .help(format!("E2B API URL used to create and destroy sandboxes. [default: {}]", Config::default_value(ConfigKey::SandboxApiURL)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::SandboxDomain.to_string())
                .long(ConfigKey::SandboxDomain.to_string())
                .env("GRAPHGEN_SANDBOX_DOMAIN")
                .num_args(1)
                .help(format!("Domain sandboxes are reachable under. [default: {}]", Config::default_value(ConfigKey::SandboxDomain)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::SandboxExecutionURL.to_string())
                .long(ConfigKey::SandboxExecutionURL.to_string())
                .env("GRAPHGEN_SANDBOX_EXECUTION_URL")
                .num_args(1)
                .help("Fixed URL for code execution instead of the per-sandbox address.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::SandboxTemplate.to_string())
                .long(ConfigKey::SandboxTemplate.to_string())
                .env("GRAPHGEN_SANDBOX_TEMPLATE")
                .num_args(1)
                .help(format!("Sandbox template to start. [default: {}]", Config::default_value(ConfigKey::SandboxTemplate)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::SandboxTimeout.to_string())
                .long(ConfigKey::SandboxTimeout.to_string())
                .env("GRAPHGEN_SANDBOX_TIMEOUT")
                .num_args(1)
                .help(format!("Seconds a sandbox may live, also used as the execution timeout. [default: {}]", Config::default_value(ConfigKey::SandboxTimeout)))
                .global(true),
        );
}

/// True when `--model` came from the command line or `GRAPHGEN_MODEL` rather
/// than the config file or the default.
fn model_given(all_matches: &[&ArgMatches]) -> bool {
    return all_matches.iter().any(|matches| {
        return matches!(
            matches.value_source(&ConfigKey::Model.to_string()),
            Some(ValueSource::CommandLine | ValueSource::EnvVariable)
        );
    });
}

fn generate_options(matches: &ArgMatches, all_matches: &[&ArgMatches]) -> GenerateOptions {
    return GenerateOptions {
        prompt: matches.get_one::<String>("prompt").cloned(),
        select_model: matches.get_flag("select-model") || !model_given(all_matches),
        stream: matches.get_flag("stream"),
    };
}

pub async fn parse() -> Result<Outcome> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("generate", subcmd_matches)) => {
            let config = Config::load(build(), vec![&matches, subcmd_matches]).await?;
            let options = generate_options(subcmd_matches, &[&matches, subcmd_matches]);
            return commands::generate(&config, options).await;
        }
        Some(("exec", subcmd_matches)) => {
            let config = Config::load(build(), vec![&matches, subcmd_matches]).await?;
            let file = subcmd_matches.get_one::<path::PathBuf>("file").cloned();
            return commands::exec(&config, file).await;
        }
        Some(("credentials", subcmd_matches)) => {
            let config = Config::load(build(), vec![&matches, subcmd_matches]).await?;
            match subcmd_matches.subcommand() {
                Some(("set", _)) => {
                    return commands::credentials_set(&config).await;
                }
                Some(("delete", _)) => {
                    return commands::credentials_delete(&config).await;
                }
                Some(("show", _)) => {
                    commands::credentials_show(&config).await?;
                }
                _ => {
                    subcommand_credentials().print_long_help()?;
                }
            }
        }
        Some(("models", subcmd_matches)) => {
            let config = Config::load(build(), vec![&matches, subcmd_matches]).await?;
            commands::models(&config).await?;
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
            }
            Some(("path", _)) => {
                println!("{}", Config::default_value(ConfigKey::ConfigFile));
            }
            _ => {
                subcommand_config().print_long_help()?;
            }
        },
        Some(("manpages", _)) => {
            clap_mangen::Man::new(build()).render(&mut io::stdout())?;
        }
        _ => {
            let config = Config::load(build(), vec![&matches]).await?;
            return commands::generate(&config, generate_options(&matches, &[&matches])).await;
        }
    }

    return Ok(Outcome::Completed);
}
