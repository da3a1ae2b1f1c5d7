use crate::context::ContextVariables;
use crate::traits::{Param, Tool, ToolCallResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

type Handler = dyn Fn(Value, &ContextVariables) -> anyhow::Result<ToolCallResult> + Send + Sync;

/// A tool backed by a synchronous closure. Handoff helpers and small inline tools use it.
pub struct FunctionTool {
    name: String,
    doc: String,
    params: Vec<Param>,
    handler: Arc<Handler>,
}

impl FunctionTool {
    pub fn new<F>(name: impl Into<String>, doc: impl Into<String>, params: Vec<Param>, handler: F) -> Self
    where
        F: Fn(Value, &ContextVariables) -> anyhow::Result<ToolCallResult> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            doc: doc.into(),
            params,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn doc(&self) -> &str {
        &self.doc
    }

    fn params(&self) -> Vec<Param> {
        self.params.clone()
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        (self.handler)(args, context)
    }
}

/// A tool that hands the conversation to `target`. The model states the
/// sub-task it is delegating; the text stays in history as the call arguments.
pub fn transfer_to(tool_name: &str, target: &str, description: &str) -> Arc<dyn Tool> {
    let target = target.to_string();
    let doc = format!(
        "{description}\n\nArgs:\n    sub_task: The detailed description of the sub-task handed to the `{target}`."
    );
    Arc::new(FunctionTool::new(
        tool_name,
        doc,
        vec![Param::required("sub_task", "string")],
        move |_, _| Ok(ToolCallResult::handoff(target.clone())),
    ))
}

/// Hands control back to `target`, reporting the status of the delegated work.
pub fn transfer_back_to(tool_name: &str, target: &str) -> Arc<dyn Tool> {
    let target = target.to_string();
    let doc = format!(
        "Call this function when you have finished your part of the task or cannot proceed, to return control to the `{target}`.\n\nArgs:\n    task_status: What was done and what is still open."
    );
    Arc::new(FunctionTool::new(
        tool_name,
        doc,
        vec![Param::required("task_status", "string")],
        move |args, _| {
            let status = args["task_status"].as_str().unwrap_or_default();
            Ok(ToolCallResult::handoff_with_value(
                status,
                target.clone(),
                ContextVariables::new(),
            ))
        },
    ))
}
