pub mod definition;
pub mod loop_;
pub mod response;
pub mod schema;

pub use definition::{Agent, AgentBuilder, AgentFactory, DEFAULT_MODEL, Instructions, ToolChoice};
pub use loop_::{DEFAULT_TERMINAL_TOOLS, Orchestrator};
pub use response::{AbortReason, Response, RunStatus, Transcript, TranscriptRecord};
pub use schema::{ParamSchema, ToolSchema};
