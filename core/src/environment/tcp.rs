use crate::environment::{Mount, SandboxConfig};
use crate::traits::{CommandOutput, SandboxEnv};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Client for a sandbox that accepts one JSON command per connection on a
/// local TCP port. Files are reached through the host side of the mount.
pub struct TcpSandbox {
    config: SandboxConfig,
    mount: Mount,
    timeout: Duration,
}

impl TcpSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        let mount = Mount::new(config.host_workspace(), format!("/{}", config.workspace_name));
        Self {
            config,
            mount,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    async fn exchange(&self, command: &str) -> anyhow::Result<CommandOutput> {
        let address = ("127.0.0.1", self.config.communication_port);
        let mut stream = TcpStream::connect(address).await.with_context(|| {
            format!(
                "Failed to connect to sandbox '{}' on port {}",
                self.config.container_name, self.config.communication_port
            )
        })?;

        let mut request = json!({ "command": command }).to_string();
        request.push('\n');
        stream.write_all(request.as_bytes()).await?;
        stream.flush().await?;

        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).await?;
        if line.trim().is_empty() {
            anyhow::bail!("sandbox closed the connection without a reply");
        }
        serde_json::from_str(line.trim()).context("Malformed sandbox reply")
    }
}

#[async_trait]
impl SandboxEnv for TcpSandbox {
    fn workspace(&self) -> &str {
        self.mount.visible()
    }

    async fn run_command(&self, command: &str) -> anyhow::Result<CommandOutput> {
        debug!(container = %self.config.container_name, command, "Sending sandbox command");
        tokio::time::timeout(self.timeout, self.exchange(command))
            .await
            .with_context(|| format!("sandbox command timed out after {}s", self.timeout.as_secs()))?
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
