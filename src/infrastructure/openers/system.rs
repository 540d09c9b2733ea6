use std::path::Path;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::models::Opener;
use crate::domain::models::OpenerName;

/// Hands files to the desktop's default application.
#[derive(Default)]
pub struct SystemOpener {}

fn command(path: &Path) -> Command {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(path);
        return cmd;
    }

    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]).arg(path);
        return cmd;
    }

    let mut cmd = Command::new("xdg-open");
    cmd.arg(path);
    return cmd;
}

#[async_trait]
impl Opener for SystemOpener {
    fn name(&self) -> OpenerName {
        return OpenerName::System;
    }

    #[allow(clippy::implicit_return)]
    async fn open(&self, path: &Path) -> Result<()> {
        let output = command(path).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(format!(
                "Failed to open {}: {}",
                path.display(),
                stderr.trim()
            ));
        }

        return Ok(());
    }
}
