use thiserror::Error;

/// Reasons a tool signature cannot be turned into a call schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("tool name is empty")]
    EmptyName,

    #[error("tool '{tool}' has no description in its doc string")]
    MissingDescription { tool: String },

    #[error("tool '{tool}': '{param}' is not a valid parameter name")]
    InvalidParamName { tool: String, param: String },

    #[error("tool '{tool}': parameter '{param}' has unsupported type '{ty}'")]
    UnsupportedType {
        tool: String,
        param: String,
        ty: String,
    },

    #[error("tool '{tool}': parameter '{param}' is declared more than once")]
    DuplicateParam { tool: String, param: String },

    #[error("tool '{tool}': parameter '{param}' has type 'context' but is not named 'context_variables'")]
    MisplacedContext { tool: String, param: String },

    #[error("tool '{tool}': doc string documents unknown parameter '{param}'")]
    UnknownDocParam { tool: String, param: String },

    #[error("agent '{agent}': tool '{tool}' is listed more than once")]
    DuplicateTool { agent: String, tool: String },

    #[error("agent '{agent}': tool_choice pins '{tool}' which the agent does not carry")]
    UnknownToolChoice { agent: String, tool: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("unknown tool '{tool}' for agent '{agent}'")]
    UnknownTool { tool: String, agent: String },

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("handoff target '{target}' could not be constructed: {reason}")]
    HandoffTargetMissing { target: String, reason: String },

    #[error("run exceeded the maximum of {max_turns} turns")]
    LoopBoundExceeded { max_turns: usize },

    #[error("model call failed: {0}")]
    Model(String),

    #[error("{kind} '{name}' is not registered")]
    NotFound { kind: &'static str, name: String },

    #[error("a registry has already been installed for this process")]
    RegistryInstalled,
}

impl Error {
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether the orchestrator recovers from this error by reporting it to the model.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownTool { .. } | Self::ToolExecution { .. } | Self::HandoffTargetMissing { .. }
        )
    }
}
