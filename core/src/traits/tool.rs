use crate::context::ContextVariables;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One declared parameter of a tool. `ty` is a type name understood by the
/// schema compiler (`string`, `integer`, `array<string>`, `context`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Param {
    pub fn required(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            default: Some(default),
        }
    }

    /// The injected context parameter. Hidden from the model.
    pub fn context() -> Self {
        Self::required(crate::agent::schema::CONTEXT_PARAM, "context")
    }
}

/// What a tool hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallResult {
    Value {
        text: String,
        image: Option<String>,
    },
    Handoff(String),
    HandoffWithValue {
        text: String,
        agent: Option<String>,
        context: ContextVariables,
        image: Option<String>,
    },
}

impl ToolCallResult {
    pub fn value(text: impl Into<String>) -> Self {
        Self::Value {
            text: text.into(),
            image: None,
        }
    }

    pub fn value_with_image(text: impl Into<String>, image: Option<String>) -> Self {
        Self::Value {
            text: text.into(),
            image,
        }
    }

    pub fn handoff(agent: impl Into<String>) -> Self {
        Self::Handoff(agent.into())
    }

    pub fn with_context(text: impl Into<String>, context: ContextVariables) -> Self {
        Self::HandoffWithValue {
            text: text.into(),
            agent: None,
            context,
            image: None,
        }
    }

    pub fn handoff_with_value(
        text: impl Into<String>,
        agent: impl Into<String>,
        context: ContextVariables,
    ) -> Self {
        Self::HandoffWithValue {
            text: text.into(),
            agent: Some(agent.into()),
            context,
            image: None,
        }
    }

    pub fn handoff_target(&self) -> Option<&str> {
        match self {
            Self::Value { .. } => None,
            Self::Handoff(agent) => Some(agent),
            Self::HandoffWithValue { agent, .. } => agent.as_deref(),
        }
    }
}

/// The provider-facing rendering of a compiled tool schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Summary followed by an optional `Args:` section with one `name: description` line per parameter.
    fn doc(&self) -> &str;

    fn params(&self) -> Vec<Param>;

    /// `context` is the live run context when the tool declares `Param::context()`,
    /// an empty map otherwise.
    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult>;
}
