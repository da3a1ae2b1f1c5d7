pub mod environment;
pub mod provider;
pub mod tool;

pub use environment::{BrowserEnv, CommandOutput, Observation, SandboxEnv};
pub use provider::{ChatMessage, ChatRequest, ChatResponse, Provider, Role, ToolCall};
pub use tool::{Param, Tool, ToolCallResult, ToolSpec};
