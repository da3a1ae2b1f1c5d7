pub mod agent;
pub mod agents;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod providers;
pub mod registry;
pub mod tools;
pub mod traits;

pub use agent::{Agent, AgentBuilder, AgentFactory, Orchestrator, Response, RunStatus, ToolChoice};
pub use context::{ContextValue, ContextVariables};
pub use error::{Error, SchemaError};
pub use registry::{Registry, RegistryBuilder};
pub use traits::*;
