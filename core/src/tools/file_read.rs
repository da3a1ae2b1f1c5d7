use crate::context::ContextVariables;
use crate::environment::code_env;
use crate::tools::extract_string_arg;
use crate::traits::{Param, Tool, ToolCallResult};
use async_trait::async_trait;
use serde_json::Value;

pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn doc(&self) -> &str {
        "Read the contents of a file in the code environment.\n\nArgs:\n    file_path: Absolute path of the file to read."
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::required("file_path", "string"), Param::context()]
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let path = extract_string_arg(&args, "file_path")?;
        let content = code_env(context)?.read_file(&path).await?;
        Ok(ToolCallResult::value(content))
    }
}
