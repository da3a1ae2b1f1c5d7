use crate::context::ContextVariables;
use crate::environment::code_env;
use crate::tools::extract_string_arg;
use crate::tools::shell::{render_output, shell_quote};
use crate::traits::{Param, Tool, ToolCallResult};
use async_trait::async_trait;
use serde_json::Value;

/// Writes a file, creating parent directories. Registered twice: as
/// `create_file` for new files and as `write_file` for overwriting.
pub struct FileWriteTool {
    name: &'static str,
    doc: &'static str,
}

impl FileWriteTool {
    pub fn create() -> Self {
        Self {
            name: "create_file",
            doc: "Create a file with the given content in the code environment.\n\nArgs:\n    path: Absolute path of the new file.\n    content: The full content of the file.",
        }
    }

    pub fn overwrite() -> Self {
        Self {
            name: "write_file",
            doc: "Overwrite a file in the code environment with new content.\n\nArgs:\n    path: Absolute path of the file.\n    content: The full new content of the file.",
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        self.name
    }

    fn doc(&self) -> &str {
        self.doc
    }

    fn params(&self) -> Vec<Param> {
        vec![
            Param::required("path", "string"),
            Param::required("content", "string"),
            Param::context(),
        ]
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let path = extract_string_arg(&args, "path")?;
        let content = extract_string_arg(&args, "content")?;
        code_env(context)?.write_file(&path, &content).await?;
        Ok(ToolCallResult::value(format!("File written at: {path}")))
    }
}

pub struct CreateDirectoryTool;

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn name(&self) -> &str {
        "create_directory"
    }

    fn doc(&self) -> &str {
        "Create a directory, including missing parents, in the code environment.\n\nArgs:\n    path: Absolute path of the directory."
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::required("path", "string"), Param::context()]
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let path = extract_string_arg(&args, "path")?;
        let output = code_env(context)?
            .run_command(&format!("mkdir -p {}", shell_quote(&path)))
            .await?;
        if !output.success() {
            return Ok(ToolCallResult::value(render_output(&output)));
        }
        Ok(ToolCallResult::value(format!("Directory created at: {path}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{LocalEnv, attach_code_env};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_files_and_directories() {
        let tmp = TempDir::new().unwrap();
        let mut context = ContextVariables::new();
        attach_code_env(&mut context, Arc::new(LocalEnv::new(tmp.path()).unwrap()));

        let result = FileWriteTool::create()
            .execute(json!({"path": "pkg/app.py", "content": "print(1)"}), &context)
            .await
            .unwrap();
        assert_eq!(result, ToolCallResult::value("File written at: pkg/app.py"));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("pkg/app.py")).unwrap(),
            "print(1)"
        );

        CreateDirectoryTool
            .execute(json!({"path": "data/raw"}), &context)
            .await
            .unwrap();
        assert!(tmp.path().join("data/raw").is_dir());
    }
}
