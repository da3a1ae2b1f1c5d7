use crate::agent::schema::{self, ToolSchema};
use crate::context::ContextVariables;
use crate::error::{Error, SchemaError};
use crate::registry::Registry;
use crate::traits::{Tool, ToolSpec};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_INSTRUCTIONS: &str = "You are a helpful agent.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    Required,
    None,
    Tool(String),
}

impl Serialize for ToolChoice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auto => serializer.serialize_str("auto"),
            Self::Required => serializer.serialize_str("required"),
            Self::None => serializer.serialize_str("none"),
            Self::Tool(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            })
            .serialize(serializer),
        }
    }
}

pub type InstructionsFn = Arc<dyn Fn(&ContextVariables) -> String + Send + Sync>;

/// Builds an agent for a model identifier. Receives the registry so it can
/// pull shared tools and sub-agent factories by name.
pub type AgentFactory = Arc<dyn Fn(&Registry, &str) -> Result<Agent, Error> + Send + Sync>;

#[derive(Clone)]
pub enum Instructions {
    Static(String),
    Dynamic(InstructionsFn),
}

impl Instructions {
    pub fn resolve(&self, context: &ContextVariables) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Dynamic(resolver) => resolver(context),
        }
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Self::Static(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Self::Static(text)
    }
}

#[derive(Clone)]
pub struct Agent {
    name: String,
    model: String,
    instructions: Instructions,
    tools: Vec<Arc<dyn Tool>>,
    schemas: Vec<ToolSchema>,
    specs: Vec<ToolSpec>,
    tool_choice: ToolChoice,
    parallel_tool_calls: bool,
    sub_agents: BTreeMap<String, AgentFactory>,
}

impl Agent {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn instructions(&self, context: &ContextVariables) -> String {
        self.instructions.resolve(context)
    }

    pub fn tool_choice(&self) -> &ToolChoice {
        &self.tool_choice
    }

    pub fn parallel_tool_calls(&self) -> bool {
        self.parallel_tool_calls
    }

    pub fn tool_specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(|s| s.name.as_str())
    }

    /// Resolves a requested tool name against this agent's own tools only.
    pub fn tool(&self, name: &str) -> Option<(&Arc<dyn Tool>, &ToolSchema)> {
        self.schemas
            .iter()
            .position(|s| s.name == name)
            .map(|i| (&self.tools[i], &self.schemas[i]))
    }

    pub fn sub_agent(&self, name: &str) -> Option<&AgentFactory> {
        self.sub_agents.get(name)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tool_names().collect::<Vec<_>>())
            .field("tool_choice", &self.tool_choice)
            .field("parallel_tool_calls", &self.parallel_tool_calls)
            .field("sub_agents", &self.sub_agents.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct AgentBuilder {
    name: String,
    model: String,
    instructions: Instructions,
    tools: Vec<Arc<dyn Tool>>,
    tool_choice: ToolChoice,
    parallel_tool_calls: bool,
    sub_agents: BTreeMap<String, AgentFactory>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: DEFAULT_MODEL.to_string(),
            instructions: Instructions::from(DEFAULT_INSTRUCTIONS),
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            parallel_tool_calls: true,
            sub_agents: BTreeMap::new(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<Instructions>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Instructions recomputed from the run context at every turn.
    pub fn instructions_fn<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&ContextVariables) -> String + Send + Sync + 'static,
    {
        self.instructions = Instructions::Dynamic(Arc::new(resolver));
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    pub fn sub_agent(mut self, name: impl Into<String>, factory: AgentFactory) -> Self {
        self.sub_agents.insert(name.into(), factory);
        self
    }

    pub fn build(self) -> Result<Agent, SchemaError> {
        let mut schemas: Vec<ToolSchema> = Vec::with_capacity(self.tools.len());
        for tool in &self.tools {
            let compiled = schema::compile(tool.as_ref())?;
            if schemas.iter().any(|s| s.name == compiled.name) {
                return Err(SchemaError::DuplicateTool {
                    agent: self.name,
                    tool: compiled.name,
                });
            }
            schemas.push(compiled);
        }

        if let ToolChoice::Tool(pinned) = &self.tool_choice
            && !schemas.iter().any(|s| &s.name == pinned)
        {
            return Err(SchemaError::UnknownToolChoice {
                agent: self.name,
                tool: pinned.clone(),
            });
        }

        let specs = schemas.iter().map(ToolSchema::spec).collect();

        Ok(Agent {
            name: self.name,
            model: self.model,
            instructions: self.instructions,
            tools: self.tools,
            schemas,
            specs,
            tool_choice: self.tool_choice,
            parallel_tool_calls: self.parallel_tool_calls,
            sub_agents: self.sub_agents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use crate::traits::{Param, ToolCallResult};
    use serde_json::json;

    fn echo() -> Arc<dyn Tool> {
        Arc::new(FunctionTool::new(
            "echo",
            "Echo the text back.\n\nArgs:\n    text: What to echo.",
            vec![Param::required("text", "string")],
            |args, _| Ok(ToolCallResult::value(args["text"].as_str().unwrap_or_default())),
        ))
    }

    #[test]
    fn builder_compiles_tool_specs() {
        let agent = Agent::builder("Echo Agent").tool(echo()).build().unwrap();

        assert_eq!(agent.model(), DEFAULT_MODEL);
        assert_eq!(agent.tool_specs().len(), 1);
        assert_eq!(agent.tool_specs()[0].parameters["required"], json!(["text"]));
        assert!(agent.tool("echo").is_some());
        assert!(agent.tool("shout").is_none());
    }

    #[test]
    fn instructions_follow_context() {
        let agent = Agent::builder("Programmer")
            .instructions_fn(|ctx| {
                format!(
                    "You work in /{}.",
                    ctx.get_str("working_dir").unwrap_or("workplace")
                )
            })
            .build()
            .unwrap();

        assert_eq!(agent.instructions(&ContextVariables::new()), "You work in /workplace.");
        let ctx = ContextVariables::new().with("working_dir", "repo");
        assert_eq!(agent.instructions(&ctx), "You work in /repo.");
    }

    #[test]
    fn broken_tool_fails_construction() {
        let broken: Arc<dyn Tool> = Arc::new(FunctionTool::new(
            "broken",
            "",
            vec![],
            |_, _| Ok(ToolCallResult::value("")),
        ));
        let err = Agent::builder("A").tool(broken).build().unwrap_err();
        assert!(matches!(err, SchemaError::MissingDescription { .. }));
    }

    #[test]
    fn rejects_duplicate_tools_and_unknown_pin() {
        let err = Agent::builder("A").tool(echo()).tool(echo()).build().unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTool { .. }));

        let err = Agent::builder("A")
            .tool(echo())
            .tool_choice(ToolChoice::Tool("shout".into()))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownToolChoice { .. }));
    }

    #[test]
    fn tool_choice_serializes_for_providers() {
        assert_eq!(serde_json::to_value(ToolChoice::Required).unwrap(), json!("required"));
        assert_eq!(
            serde_json::to_value(ToolChoice::Tool("echo".into())).unwrap(),
            json!({"type": "function", "function": {"name": "echo"}})
        );
    }
}
