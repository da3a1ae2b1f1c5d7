use crate::context::ContextVariables;
use crate::tools::extract_string_arg;
use crate::traits::{Param, Tool, ToolCallResult};
use async_trait::async_trait;
use serde_json::Value;

/// Ends a run with a solution. The orchestrator treats it as terminal.
pub struct CaseResolvedTool;

#[async_trait]
impl Tool for CaseResolvedTool {
    fn name(&self) -> &str {
        "case_resolved"
    }

    fn doc(&self) -> &str {
        "Use this function when the case is resolved and no further actions are needed.\n\nArgs:\n    result: The final result of the case resolution following the instructions."
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::required("result", "string")]
    }

    async fn execute(&self, args: Value, _context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let result = extract_string_arg(&args, "result")?;
        Ok(ToolCallResult::value(format!(
            "Case resolved. No further actions are needed. The result of the case resolution is: {result}"
        )))
    }
}

/// Ends a run without a solution.
pub struct CaseNotResolvedTool;

#[async_trait]
impl Tool for CaseNotResolvedTool {
    fn name(&self) -> &str {
        "case_not_resolved"
    }

    fn doc(&self) -> &str {
        "Use this function when the case is not resolved after all agents have tried their best.\n\nArgs:\n    failure_reason: Why the case could not be resolved."
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::required("failure_reason", "string")]
    }

    async fn execute(&self, args: Value, _context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let reason = extract_string_arg(&args, "failure_reason")?;
        Ok(ToolCallResult::value(format!(
            "Case not resolved. No further actions are needed. The reason is: {reason}"
        )))
    }
}
