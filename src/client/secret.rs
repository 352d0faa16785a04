//! Password sources.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::traits::SecretSource;

/// A password known up front.
pub struct StaticSecret(String);

impl StaticSecret {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }
}

#[async_trait]
impl SecretSource for StaticSecret {
    async fn password(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Runs a shell command and uses the first line it prints, the way
/// `password_eval` works in mail and chat clients.
pub struct CommandSecret {
    command: String,
}

impl CommandSecret {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl SecretSource for CommandSecret {
    async fn password(&self) -> Result<String> {
        tracing::debug!("Running password command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to run password_eval command")?;

        if !output.status.success() {
            bail!(
                "password_eval command failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let stdout = String::from_utf8(output.stdout).context("Password is not valid UTF-8")?;
        match stdout.lines().next() {
            Some(line) if !line.is_empty() => Ok(line.to_string()),
            _ => bail!("password_eval command printed nothing"),
        }
    }
}
