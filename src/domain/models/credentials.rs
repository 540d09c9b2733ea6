use anyhow::Result;
use async_trait::async_trait;

/// Identifier the sandbox API key is stored under.
pub const SANDBOX_API_KEY: &str = "e2b.apiKey";

#[async_trait]
pub trait CredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

pub type CredentialStoreBox = Box<dyn CredentialStore + Send + Sync>;

pub fn is_valid_api_key(api_key: &str) -> bool {
    return !api_key.trim().is_empty();
}

/// Masks all but the last four characters of a secret for display.
pub fn mask_secret(secret: &str) -> String {
    let chars = secret.chars().collect::<Vec<char>>();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }

    let visible = chars[chars.len() - 4..].iter().collect::<String>();
    return format!("{}{visible}", "*".repeat(chars.len() - 4));
}
