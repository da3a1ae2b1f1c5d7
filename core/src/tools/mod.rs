use crate::error::SchemaError;
use crate::registry::RegistryBuilder;
use serde_json::Value;
use std::sync::Arc;

pub mod browser;
pub mod file_read;
pub mod file_write;
pub mod function;
pub mod inner;
pub mod list_files;
pub mod meta;
pub mod plugin;
pub mod shell;
pub mod tree;

pub use browser::{BrowserAction, BrowserActionTool};
pub use file_read::FileReadTool;
pub use file_write::{CreateDirectoryTool, FileWriteTool};
pub use function::{FunctionTool, transfer_back_to, transfer_to};
pub use inner::{CaseNotResolvedTool, CaseResolvedTool};
pub use list_files::ListFilesTool;
pub use meta::{ListAgentsTool, ListToolsTool};
pub use plugin::{PluginEdit, PluginToolEditor};
pub use shell::{ExecuteCommandTool, RunPythonTool};
pub use tree::CodeTreeTool;

pub fn extract_string_arg(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
        .map(|s| s.to_string())
}

pub fn extract_string_arg_opt(args: &Value, key: &str, default: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

/// Registers every tool shipped with the crate.
pub fn register_builtin_tools(builder: &mut RegistryBuilder) -> Result<(), SchemaError> {
    builder
        .register_tool(Arc::new(ExecuteCommandTool))?
        .register_tool(Arc::new(RunPythonTool))?
        .register_tool(Arc::new(FileReadTool))?
        .register_tool(Arc::new(FileWriteTool::create()))?
        .register_tool(Arc::new(FileWriteTool::overwrite()))?
        .register_tool(Arc::new(CreateDirectoryTool))?
        .register_tool(Arc::new(ListFilesTool))?
        .register_tool(Arc::new(CodeTreeTool))?
        .register_tool(Arc::new(CaseResolvedTool))?
        .register_tool(Arc::new(CaseNotResolvedTool))?
        .register_tool(Arc::new(ListToolsTool::default()))?
        .register_tool(Arc::new(ListAgentsTool::default()))?;
    for tool in BrowserActionTool::all().into_iter().chain(PluginToolEditor::all()) {
        builder.register_tool(tool)?;
    }
    Ok(())
}
