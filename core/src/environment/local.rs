use crate::environment::Mount;
use crate::traits::{CommandOutput, SandboxEnv};
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs commands directly on the host with `sh -c`, rooted at a workspace directory.
pub struct LocalEnv {
    mount: Mount,
    timeout: Duration,
}

impl LocalEnv {
    pub fn new(workspace: impl AsRef<Path>) -> anyhow::Result<Self> {
        let workspace = workspace.as_ref();
        std::fs::create_dir_all(workspace)
            .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;
        let host: PathBuf = workspace.canonicalize()?;
        let visible = host.display().to_string();
        Ok(Self {
            mount: Mount::new(host, visible),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SandboxEnv for LocalEnv {
    fn workspace(&self) -> &str {
        self.mount.visible()
    }

    async fn run_command(&self, command: &str) -> anyhow::Result<CommandOutput> {
        debug!(command, "Running local command");
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.mount.host())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .with_context(|| format!("command timed out after {}s", self.timeout.as_secs()))?
            .context("Failed to execute command")?;

        let mut result = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !result.is_empty() && !result.ends_with('\n') {
                result.push('\n');
            }
            result.push_str(&stderr);
        }

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            result,
        })
    }

    async fn read_file(&self, path: &str) -> anyhow::Result<String> {
        self.mount.read_file(path).await
    }

    async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<()> {
        self.mount.write_file(path, content).await
    }

    async fn list_files(&self, path: &str) -> anyhow::Result<Vec<String>> {
        self.mount.list_files(path).await
    }
}
