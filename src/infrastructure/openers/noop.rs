#[cfg(test)]
#[path = "noop_test.rs"]
mod tests;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::Opener;
use crate::domain::models::OpenerName;

#[derive(Default)]
pub struct NoopOpener {}

#[async_trait]
impl Opener for NoopOpener {
    fn name(&self) -> OpenerName {
        return OpenerName::None;
    }

    #[allow(clippy::implicit_return)]
    async fn open(&self, path: &Path) -> Result<()> {
        tracing::debug!(path = %path.display(), "Skipping open");
        return Ok(());
    }
}
