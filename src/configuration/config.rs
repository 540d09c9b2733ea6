#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::collections::HashMap;
use std::env;
use std::path;
use std::str::FromStr;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

use crate::domain::models::OpenerName;
use crate::domain::services::FileNaming;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    BackendHealthCheckTimeout,
    ConfigFile,
    CredentialsFile,
    FileNaming,
    MaxTokens,
    Model,
    OllamaURL,
    Opener,
    OutputDir,
    SandboxApiKey,
    SandboxApiURL,
    SandboxDomain,
    SandboxExecutionURL,
    SandboxTemplate,
    SandboxTimeout,
}

fn config_dir() -> path::PathBuf {
    #[cfg(not(target_os = "macos"))]
    let dir = dirs::config_dir().unwrap_or_else(|| return path::PathBuf::from("."));
    #[cfg(target_os = "macos")]
    let dir = env::var("HOME")
        .map(|home| return path::PathBuf::from(home).join(".config"))
        .unwrap_or_else(|_| return path::PathBuf::from("."));

    return dir.join("graphgen");
}

/// Resolved settings for one invocation. Built once by [`Config::load`] and
/// handed to every component that needs it.
#[derive(Clone, Debug)]
pub struct Config {
    values: HashMap<ConfigKey, String>,
}

impl Default for Config {
    fn default() -> Config {
        let mut config = Config {
            values: HashMap::new(),
        };
        for key in ConfigKey::iter() {
            config.set(key, &Config::default_value(key));
        }

        return config;
    }
}

impl Config {
    pub fn get(&self, key: ConfigKey) -> String {
        if let Some(val) = self.values.get(&key) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(&mut self, key: ConfigKey, value: &str) {
        self.values.insert(key, value.to_string());
    }

    /// Parses a value, failing with the offending key in the message.
    pub fn parse<T: FromStr>(&self, key: ConfigKey) -> Result<T> {
        let val = self.get(key);
        return val
            .trim()
            .parse::<T>()
            .map_err(|_| return anyhow!("Invalid value for '{key}': {val}"));
    }

    /// `None` for an empty value.
    pub fn get_opt(&self, key: ConfigKey) -> Option<String> {
        let val = self.get(key);
        if val.trim().is_empty() {
            return None;
        }

        return Some(val);
    }

    pub fn max_tokens(&self) -> Result<Option<u32>> {
        if self.get_opt(ConfigKey::MaxTokens).is_none() {
            return Ok(None);
        }

        let max_tokens = self.parse::<u32>(ConfigKey::MaxTokens)?;
        if max_tokens == 0 {
            bail!("Invalid value for '{}': max tokens must be a positive number", ConfigKey::MaxTokens);
        }

        return Ok(Some(max_tokens));
    }

    pub fn file_naming(&self) -> Result<FileNaming> {
        let val = self.get(ConfigKey::FileNaming);
        return FileNaming::parse(val.to_string())
            .ok_or_else(|| return anyhow!("Invalid value for '{}': {val}", ConfigKey::FileNaming));
    }

    pub fn opener(&self) -> Result<OpenerName> {
        let val = self.get(ConfigKey::Opener);
        return OpenerName::parse(val.to_string())
            .ok_or_else(|| return anyhow!("Invalid value for '{}': {val}", ConfigKey::Opener));
    }

    /// The output directory, relative paths resolved against the current
    /// directory. Empty means the current directory itself.
    pub fn output_dir(&self) -> Result<path::PathBuf> {
        let cwd = env::current_dir()?;
        return match self.get_opt(ConfigKey::OutputDir) {
            Some(dir) => Ok(cwd.join(dir)),
            None => Ok(cwd),
        };
    }

    pub fn default_value(key: ConfigKey) -> String {
        let config_file = config_dir().join("config.toml");
        let credentials_file = config_dir().join("credentials.json");

        let res = match key {
            ConfigKey::BackendHealthCheckTimeout => "1000".to_string(),
            ConfigKey::FileNaming => FileNaming::Timestamp.to_string(),
            ConfigKey::MaxTokens => "4096".to_string(),
            ConfigKey::Model => "gemma3:27b".to_string(),
            ConfigKey::OllamaURL => "http://localhost:11434".to_string(),
            ConfigKey::Opener => OpenerName::System.to_string(),
            ConfigKey::OutputDir => "".to_string(),
            ConfigKey::SandboxApiKey => "".to_string(),
            ConfigKey::SandboxApiURL => "https://api.e2b.dev".to_string(),
            ConfigKey::SandboxDomain => "e2b.app".to_string(),
            ConfigKey::SandboxExecutionURL => "".to_string(),
            ConfigKey::SandboxTemplate => "code-interpreter-v1".to_string(),
            ConfigKey::SandboxTimeout => "300".to_string(),

            // Special
            ConfigKey::ConfigFile => config_file.to_string_lossy().to_string(),
            ConfigKey::CredentialsFile => credentials_file.to_string_lossy().to_string(),
        };

        return res;
    }

    /// Layers defaults, the TOML config file, and finally flags and
    /// environment variables captured by clap.
    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<Config> {
        let mut config = Config::default();

        let mut config_file = Config::default_value(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                if let Some(val) = doc.get(&key.to_string()) {
                    // Use clap value parsers to do validation.
                    let mut possible_values = vec![];
                    if let Some(arg) = cmd
                        .get_arguments()
                        .find(|e| return e.get_long() == Some(key.to_string().as_str()))
                    {
                        possible_values = arg
                            .get_possible_values()
                            .iter()
                            .map(|e| return e.get_name().to_string())
                            .collect::<Vec<String>>();
                    }

                    if let Some(val_int) = val.as_integer() {
                        config.set(key, &val_int.to_string());
                    } else if let Some(val_str) = val.as_str() {
                        if val_str.is_empty() {
                            continue;
                        }
                        if !possible_values.is_empty()
                            && !possible_values.contains(&val_str.to_string())
                        {
                            bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}", possible_values.join(", ")));
                        }
                        config.set(key, val_str);
                    }
                }
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    config.set(key, val)
                }
            }
        }

        tracing::debug!(
            model = config.get(ConfigKey::Model),
            ollama_url = config.get(ConfigKey::OllamaURL),
            output_dir = config.get(ConfigKey::OutputDir),
            file_naming = config.get(ConfigKey::FileNaming),
            opener = config.get(ConfigKey::Opener),
            sandbox_api_url = config.get(ConfigKey::SandboxApiURL),
            "config"
        );

        return Ok(config);
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile || key == ConfigKey::SandboxApiKey {
                    return None;
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let mut description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default();

                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                if !arg.get_possible_values().is_empty() {
                    let possible_values = arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name())
                        .collect::<Vec<_>>()
                        .join(", ");
                    description = format!("{description} [possible values: {}]", possible_values);
                }

                let mut val = Config::default_value(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i32>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
