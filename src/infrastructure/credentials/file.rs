#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::CredentialStore;

type Secrets = BTreeMap<String, String>;

/// Stores secrets in a JSON file readable only by the current user.
pub struct FileCredentialStore {
    file_path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(file_path: PathBuf) -> FileCredentialStore {
        return FileCredentialStore { file_path };
    }

    pub fn from_config(config: &Config) -> FileCredentialStore {
        return FileCredentialStore::new(PathBuf::from(config.get(ConfigKey::CredentialsFile)));
    }

    async fn read(&self) -> Result<Secrets> {
        if !self.file_path.exists() {
            return Ok(Secrets::new());
        }

        let payload = fs::read_to_string(&self.file_path).await?;
        if payload.trim().is_empty() {
            return Ok(Secrets::new());
        }

        let secrets: Secrets = serde_json::from_str(&payload).with_context(|| {
            return format!(
                "Credentials file {} is not valid JSON",
                self.file_path.display()
            );
        })?;

        return Ok(secrets);
    }

    async fn write(&self, secrets: &Secrets) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_string_pretty(secrets)?;
        let mut file = fs::File::create(&self.file_path).await?;
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.file_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        return Ok(());
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    #[allow(clippy::implicit_return)]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let secrets = self.read().await?;
        return Ok(secrets.get(key).cloned());
    }

    #[allow(clippy::implicit_return)]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut secrets = self.read().await?;
        secrets.insert(key.to_string(), value.to_string());
        self.write(&secrets).await?;

        tracing::debug!(key, "Stored credential");
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn delete(&self, key: &str) -> Result<()> {
        let mut secrets = self.read().await?;
        if secrets.remove(key).is_none() {
            return Ok(());
        }

        self.write(&secrets).await?;
        tracing::debug!(key, "Deleted credential");
        return Ok(());
    }
}
