use crate::agent::DEFAULT_MODEL;
use crate::environment::SandboxConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const BATON_DIR: &str = ".baton";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxSettings {
    pub workspace_name: String,
    pub container_name: String,
    /// First port tried when allocating the sandbox communication port.
    pub port: u16,
    /// Host directory holding the workspace; `~/.baton/sandboxes/<container_name>` when unset.
    pub local_root: Option<PathBuf>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            workspace_name: "workplace".to_string(),
            container_name: "baton".to_string(),
            port: 12345,
            local_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub max_turns: usize,
    pub temperature: f64,
    pub debug: bool,
    pub sandbox: SandboxSettings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: None,
            api_key: String::new(),
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            max_turns: 30,
            temperature: 1.0,
            debug: false,
            sandbox: SandboxSettings::default(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        if config_exists() {
            load_config()
        } else {
            Ok(Config::default())
        }
    }

    pub fn local_root(&self) -> PathBuf {
        self.sandbox.local_root.clone().unwrap_or_else(|| {
            get_baton_dir()
                .join("sandboxes")
                .join(&self.sandbox.container_name)
        })
    }

    /// Sandbox settings bound to an allocated communication port.
    pub fn sandbox_config(&self, communication_port: u16) -> SandboxConfig {
        SandboxConfig {
            workspace_name: self.sandbox.workspace_name.clone(),
            container_name: self.sandbox.container_name.clone(),
            communication_port,
            local_root: self.local_root(),
        }
    }
}

pub fn get_baton_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(BATON_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_baton_dir().join("config.toml")
}

pub fn ensure_baton_dir() -> Result<PathBuf> {
    let baton_dir = get_baton_dir();

    if !baton_dir.exists() {
        std::fs::create_dir_all(&baton_dir).with_context(|| {
            format!("Failed to create baton directory at {}", baton_dir.display())
        })?;
    }

    Ok(baton_dir)
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(config_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!("Config file not found. Run 'baton onboard' to set up your configuration.")
        } else {
            anyhow::anyhow!("Failed to read config from {}: {}", config_path.display(), e)
        }
    })?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))
}

pub fn save_config(config: &Config) -> Result<()> {
    ensure_baton_dir()?;
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &Config, config_path: &Path) -> Result<()> {
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}
