use crate::context::ContextVariables;
use crate::environment::code_env;
use crate::tools::{extract_string_arg, extract_string_arg_opt};
use crate::traits::{CommandOutput, Param, Tool, ToolCallResult};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Longest command output handed back to the model; the tail is kept.
const MAX_OUTPUT_CHARS: usize = 12_000;

pub(crate) fn render_output(output: &CommandOutput) -> String {
    let result = truncate_head(&output.result, MAX_OUTPUT_CHARS);
    if output.success() {
        result
    } else {
        format!("[The command failed with exit code {}]\n{result}", output.status)
    }
}

fn truncate_head(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max_chars).collect();
    format!("[Output truncated, showing the last {max_chars} characters]\n{tail}")
}

pub struct ExecuteCommandTool;

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn doc(&self) -> &str {
        "Execute a shell command in the code environment and return its output.\n\nArgs:\n    command: The shell command to run."
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::required("command", "string"), Param::context()]
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let command = extract_string_arg(&args, "command")?;
        let env = code_env(context)?;
        let output = env.run_command(&command).await?;
        Ok(ToolCallResult::value(render_output(&output)))
    }
}

pub struct RunPythonTool;

#[async_trait]
impl Tool for RunPythonTool {
    fn name(&self) -> &str {
        "run_python"
    }

    fn doc(&self) -> &str {
        "Run a python script in the code environment.\n\nArgs:\n    code_path: Absolute path of the script to run.\n    cwd: Directory to run the script from, the workspace root when empty."
    }

    fn params(&self) -> Vec<Param> {
        vec![
            Param::required("code_path", "string"),
            Param::optional("cwd", "string", json!("")),
            Param::context(),
        ]
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let code_path = extract_string_arg(&args, "code_path")?;
        let env = code_env(context)?;
        let cwd = match extract_string_arg_opt(&args, "cwd", "") {
            cwd if cwd.is_empty() => env.workspace().to_string(),
            cwd => cwd,
        };
        let command = format!("cd {} && python {}", shell_quote(&cwd), shell_quote(&code_path));
        let output = env.run_command(&command).await?;
        Ok(ToolCallResult::value(render_output(&output)))
    }
}

pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
