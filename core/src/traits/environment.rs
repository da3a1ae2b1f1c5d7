use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub status: i32,
    pub result: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// An isolated runtime where code-execution tools run commands and touch files.
#[async_trait]
pub trait SandboxEnv: Send + Sync {
    /// Workspace root as seen from inside the sandbox.
    fn workspace(&self) -> &str;

    async fn run_command(&self, command: &str) -> anyhow::Result<CommandOutput>;

    async fn read_file(&self, path: &str) -> anyhow::Result<String>;

    async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<()>;

    async fn list_files(&self, path: &str) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    pub content: String,
    pub url: String,
    pub screenshot: Option<String>,
    pub open_pages: Vec<String>,
    pub active_page_index: Option<usize>,
    pub axtree: String,
    pub dom_snapshot: serde_json::Value,
    pub focused_element: Option<String>,
    pub last_action: String,
    pub last_action_error: String,
}

impl Observation {
    pub fn has_error(&self) -> bool {
        !self.last_action_error.is_empty()
    }
}

#[async_trait]
pub trait BrowserEnv: Send + Sync {
    async fn step(&self, action: &str) -> anyhow::Result<Observation>;
}
