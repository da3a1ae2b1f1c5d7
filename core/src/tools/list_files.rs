use crate::context::ContextVariables;
use crate::environment::code_env;
use crate::tools::extract_string_arg;
use crate::traits::{Param, Tool, ToolCallResult};
use async_trait::async_trait;
use serde_json::Value;

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn doc(&self) -> &str {
        "List every file below a directory of the code environment.\n\nArgs:\n    path: Absolute path of the directory."
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::required("path", "string"), Param::context()]
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let path = extract_string_arg(&args, "path")?;
        let files = code_env(context)?.list_files(&path).await?;
        if files.is_empty() {
            return Ok(ToolCallResult::value(format!("No files under {path}")));
        }
        Ok(ToolCallResult::value(files.join("\n")))
    }
}
