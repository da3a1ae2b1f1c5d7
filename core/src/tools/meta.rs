use crate::context::ContextVariables;
use crate::registry::{self, Registry};
use crate::traits::{Param, Tool, ToolCallResult};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Which registry an introspection tool reads: a fixed one, or the one
/// installed for the process at call time.
#[derive(Clone, Default)]
enum Source {
    #[default]
    Global,
    Fixed(Arc<Registry>),
}

impl Source {
    fn registry(&self) -> anyhow::Result<Arc<Registry>> {
        match self {
            Self::Global => registry::global().context("no registry has been installed"),
            Self::Fixed(registry) => Ok(Arc::clone(registry)),
        }
    }
}

#[derive(Clone, Default)]
pub struct ListToolsTool {
    source: Source,
}

impl ListToolsTool {
    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self {
            source: Source::Fixed(registry),
        }
    }
}

#[async_trait]
impl Tool for ListToolsTool {
    fn name(&self) -> &str {
        "list_tools"
    }

    fn doc(&self) -> &str {
        "List every registered tool with its parameters, description and source location."
    }

    fn params(&self) -> Vec<Param> {
        vec![]
    }

    async fn execute(&self, _args: Value, _context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let tools = self.source.registry()?.list_tools();
        Ok(ToolCallResult::value(serde_json::to_string_pretty(&tools)?))
    }
}

#[derive(Clone, Default)]
pub struct ListAgentsTool {
    source: Source,
}

impl ListAgentsTool {
    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self {
            source: Source::Fixed(registry),
        }
    }
}

#[async_trait]
impl Tool for ListAgentsTool {
    fn name(&self) -> &str {
        "list_agents"
    }

    fn doc(&self) -> &str {
        "List every registered agent with its lookup key, description and source location."
    }

    fn params(&self) -> Vec<Param> {
        vec![]
    }

    async fn execute(&self, _args: Value, _context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let agents = self.source.registry()?.list_agents();
        Ok(ToolCallResult::value(serde_json::to_string_pretty(&agents)?))
    }
}
