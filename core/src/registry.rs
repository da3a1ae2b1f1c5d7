use crate::agent::schema::{self, ParamSchema};
use crate::agent::{Agent, AgentFactory};
use crate::error::{Error, SchemaError};
use crate::traits::Tool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::Location;
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl From<&Location<'_>> for SourceLocation {
    fn from(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSchema>,
    pub source: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub func_name: String,
    pub description: String,
    pub parameters: Vec<ParamSchema>,
    pub source: SourceLocation,
}

struct ToolEntry {
    tool: Arc<dyn Tool>,
    info: ToolInfo,
}

struct AgentEntry {
    factory: AgentFactory,
    info: AgentInfo,
}

#[derive(Default)]
pub struct RegistryBuilder {
    tools: BTreeMap<String, ToolEntry>,
    agents: BTreeMap<String, AgentEntry>,
}

impl RegistryBuilder {
    /// Compiles the tool's schema and records it; re-registering a name overwrites.
    #[track_caller]
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<&mut Self, SchemaError> {
        let source = SourceLocation::from(Location::caller());
        let schema = schema::compile(tool.as_ref())?;
        let info = ToolInfo {
            name: schema.name.clone(),
            description: schema.description,
            parameters: schema.parameters,
            source,
        };
        self.tools.insert(schema.name, ToolEntry { tool, info });
        Ok(self)
    }

    #[track_caller]
    pub fn register_agent<F>(
        &mut self,
        name: &str,
        func_name: &str,
        description: &str,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(&Registry, &str) -> Result<Agent, Error> + Send + Sync + 'static,
    {
        let info = AgentInfo {
            name: name.to_string(),
            func_name: func_name.to_string(),
            description: description.to_string(),
            parameters: vec![ParamSchema {
                name: "model".to_string(),
                ty: "string".to_string(),
                required: true,
                description: Some("Model identifier the agent runs on.".to_string()),
                default: None,
            }],
            source: SourceLocation::from(Location::caller()),
        };
        self.agents.retain(|_, entry| entry.info.func_name != func_name);
        self.agents.insert(
            name.to_string(),
            AgentEntry {
                factory: Arc::new(factory),
                info,
            },
        );
        self
    }

    pub fn build(self) -> Registry {
        let agent_keys = self
            .agents
            .values()
            .map(|entry| (entry.info.func_name.clone(), entry.info.name.clone()))
            .collect();
        Registry {
            tools: self.tools,
            agents: self.agents,
            agent_keys,
        }
    }
}

/// Name-indexed catalogue of tools and agent factories. Read-only once built.
#[derive(Default)]
pub struct Registry {
    tools: BTreeMap<String, ToolEntry>,
    agents: BTreeMap<String, AgentEntry>,
    agent_keys: BTreeMap<String, String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn tool(&self, name: &str) -> Result<Arc<dyn Tool>, Error> {
        self.tools
            .get(name)
            .map(|entry| Arc::clone(&entry.tool))
            .ok_or_else(|| Error::NotFound {
                kind: "tool",
                name: name.to_string(),
            })
    }

    pub fn tools<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<Vec<Arc<dyn Tool>>, Error> {
        names.into_iter().map(|name| self.tool(name)).collect()
    }

    /// Looks an agent factory up by display name or by `func_name`.
    pub fn agent_factory(&self, key: &str) -> Result<AgentFactory, Error> {
        let name = self.agent_keys.get(key).map(String::as_str).unwrap_or(key);
        self.agents
            .get(name)
            .map(|entry| Arc::clone(&entry.factory))
            .ok_or_else(|| Error::NotFound {
                kind: "agent",
                name: key.to_string(),
            })
    }

    pub fn agent(&self, key: &str, model: &str) -> Result<Agent, Error> {
        let factory = self.agent_factory(key)?;
        factory(self, model)
    }

    pub fn contains_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn contains_agent(&self, key: &str) -> bool {
        self.agents.contains_key(key) || self.agent_keys.contains_key(key)
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools.values().map(|entry| entry.info.clone()).collect()
    }

    pub fn list_agents(&self) -> Vec<AgentInfo> {
        self.agents.values().map(|entry| entry.info.clone()).collect()
    }
}

/// Publishes the process-wide registry. Succeeds once.
pub fn install(registry: Registry) -> Result<Arc<Registry>, Error> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(Arc::clone(&registry))
        .map_err(|_| Error::RegistryInstalled)?;
    Ok(registry)
}

pub fn global() -> Option<Arc<Registry>> {
    GLOBAL.get().cloned()
}
