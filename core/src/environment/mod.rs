pub mod local;
pub mod port;
pub mod tcp;

pub use local::LocalEnv;
pub use port::{PortLease, allocate_port, release_port};
pub use tcp::TcpSandbox;

use crate::context::ContextVariables;
use crate::traits::{BrowserEnv, SandboxEnv};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Context key under which the code sandbox handle is stored.
pub const CODE_ENV: &str = "code_env";
/// Context key under which the browser handle is stored.
pub const WEB_ENV: &str = "web_env";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub workspace_name: String,
    pub container_name: String,
    pub communication_port: u16,
    pub local_root: PathBuf,
}

impl SandboxConfig {
    /// Host directory mounted into the sandbox as `/<workspace_name>`.
    pub fn host_workspace(&self) -> PathBuf {
        self.local_root.join(&self.workspace_name)
    }
}

pub fn attach_code_env(context: &mut ContextVariables, env: Arc<dyn SandboxEnv>) {
    context.insert_handle(CODE_ENV, env);
}

pub fn code_env(context: &ContextVariables) -> anyhow::Result<Arc<dyn SandboxEnv>> {
    match context.handle::<Arc<dyn SandboxEnv>>(CODE_ENV) {
        Some(env) => Ok(Arc::clone(&env)),
        None => bail!("no code environment in context_variables['{CODE_ENV}']"),
    }
}

pub fn attach_web_env(context: &mut ContextVariables, env: Arc<dyn BrowserEnv>) {
    context.insert_handle(WEB_ENV, env);
}

pub fn web_env(context: &ContextVariables) -> anyhow::Result<Arc<dyn BrowserEnv>> {
    match context.handle::<Arc<dyn BrowserEnv>>(WEB_ENV) {
        Some(env) => Ok(Arc::clone(&env)),
        None => bail!("no browser environment in context_variables['{WEB_ENV}']"),
    }
}

/// Maps paths as the sandbox sees them onto the host directory backing them.
#[derive(Debug, Clone)]
pub(crate) struct Mount {
    host: PathBuf,
    visible: String,
}

impl Mount {
    pub(crate) fn new(host: impl Into<PathBuf>, visible: impl Into<String>) -> Self {
        let visible = visible.into();
        Self {
            host: host.into(),
            visible: visible.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn host(&self) -> &Path {
        &self.host
    }

    pub(crate) fn visible(&self) -> &str {
        &self.visible
    }

    /// Relative paths are taken from the workspace root. Absolute paths must
    /// stay under it and `..` is refused.
    pub(crate) fn resolve(&self, path: &str) -> anyhow::Result<PathBuf> {
        let relative = if Path::new(path).is_absolute() {
            match Path::new(path).strip_prefix(&self.visible) {
                Ok(rest) => rest,
                Err(_) => bail!("path '{path}' is outside the workspace {}", self.visible),
            }
        } else {
            Path::new(path)
        };

        let mut resolved = self.host.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => bail!("path '{path}' escapes the workspace"),
            }
        }
        Ok(resolved)
    }

    pub(crate) fn to_visible(&self, host_path: &Path) -> String {
        match host_path.strip_prefix(&self.host) {
            Ok(rest) if rest.as_os_str().is_empty() => self.visible.clone(),
            Ok(rest) => format!("{}/{}", self.visible, rest.display()),
            Err(_) => host_path.display().to_string(),
        }
    }

    pub(crate) async fn read_file(&self, path: &str) -> anyhow::Result<String> {
        let host = self.resolve(path)?;
        tokio::fs::read_to_string(&host)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read {path}: {e}"))
    }

    pub(crate) async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<()> {
        let host = self.resolve(path)?;
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&host, content)
            .await
            .map_err(|e| anyhow::anyhow!("failed to write {path}: {e}"))
    }

    pub(crate) async fn list_files(&self, path: &str) -> anyhow::Result<Vec<String>> {
        let root = self.resolve(path)?;
        if !root.is_dir() {
            bail!("'{path}' is not a directory");
        }
        let mount = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut files: Vec<String> = walkdir::WalkDir::new(&root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| mount.to_visible(entry.path()))
                .collect();
            files.sort();
            files
        })
        .await
        .map_err(Into::into)
    }
}
