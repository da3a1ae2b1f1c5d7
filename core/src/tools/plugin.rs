use crate::context::ContextVariables;
use crate::environment::code_env;
use crate::tools::extract_string_arg;
use crate::tools::shell::{render_output, shell_quote};
use crate::traits::{Param, SandboxEnv, Tool, ToolCallResult};
use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Workspace subdirectory holding user-authored plugin tools.
pub const PLUGIN_DIR: &str = "plugins";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginEdit {
    Create,
    Update,
    Delete,
    Test,
}

impl PluginEdit {
    pub const ALL: [PluginEdit; 4] = [Self::Create, Self::Update, Self::Delete, Self::Test];

    fn name(self) -> &'static str {
        match self {
            Self::Create => "create_tool",
            Self::Update => "update_tool",
            Self::Delete => "delete_tool",
            Self::Test => "test_tool",
        }
    }

    fn doc(self) -> &'static str {
        match self {
            Self::Create => "Create a plugin tool as a python module in the plugins directory of the code environment.\n\nArgs:\n    tool_name: The name of the tool, a python identifier.\n    tool_code: The full python source of the tool.",
            Self::Update => "Replace the source of an existing plugin tool.\n\nArgs:\n    tool_name: The name of the tool to update.\n    tool_code: The full new python source of the tool.",
            Self::Delete => "Delete an existing plugin tool.\n\nArgs:\n    tool_name: The name of the tool to delete.",
            Self::Test => "Write a test script for a plugin tool and run it from the plugins directory.\n\nArgs:\n    tool_name: The name of the tool under test.\n    test_code: Python source that imports and exercises the tool.",
        }
    }

    fn params(self) -> Vec<Param> {
        let mut params = vec![Param::required("tool_name", "string")];
        match self {
            Self::Create | Self::Update => params.push(Param::required("tool_code", "string")),
            Self::Test => params.push(Param::required("test_code", "string")),
            Self::Delete => {}
        }
        params.push(Param::context());
        params
    }
}

fn validate_name(name: &str) -> anyhow::Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("'{name}' is not a valid tool name, use letters, digits and underscores");
    }
    Ok(())
}

fn plugin_dir(env: &dyn SandboxEnv) -> String {
    format!("{}/{PLUGIN_DIR}", env.workspace())
}

fn plugin_path(env: &dyn SandboxEnv, name: &str) -> String {
    format!("{}/{name}.py", plugin_dir(env))
}

async fn exists(env: &dyn SandboxEnv, path: &str) -> bool {
    env.read_file(path).await.is_ok()
}

/// Edits plugin tools living under `<workspace>/plugins` of the code environment.
pub struct PluginToolEditor {
    edit: PluginEdit,
}

impl PluginToolEditor {
    pub fn new(edit: PluginEdit) -> Self {
        Self { edit }
    }

    pub fn all() -> Vec<Arc<dyn Tool>> {
        PluginEdit::ALL
            .into_iter()
            .map(|edit| Arc::new(Self::new(edit)) as Arc<dyn Tool>)
            .collect()
    }
}

#[async_trait]
impl Tool for PluginToolEditor {
    fn name(&self) -> &str {
        self.edit.name()
    }

    fn doc(&self) -> &str {
        self.edit.doc()
    }

    fn params(&self) -> Vec<Param> {
        self.edit.params()
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let name = extract_string_arg(&args, "tool_name")?;
        validate_name(&name)?;
        let env = code_env(context)?;
        let env = env.as_ref();
        let path = plugin_path(env, &name);
        let present = exists(env, &path).await;
        debug!(tool = %name, edit = self.edit.name(), present, "Editing plugin tool");

        let text = match self.edit {
            PluginEdit::Create if present => {
                format!("The tool `{name}` already exists, use `update_tool` to change it.")
            }
            PluginEdit::Update | PluginEdit::Delete | PluginEdit::Test if !present => {
                format!("The tool `{name}` does not exist.")
            }
            PluginEdit::Create | PluginEdit::Update => {
                let code = extract_string_arg(&args, "tool_code")?;
                env.write_file(&path, &code).await?;
                let verb = if self.edit == PluginEdit::Create { "created" } else { "updated" };
                format!("Successfully {verb} tool: {name} in {path}")
            }
            PluginEdit::Delete => {
                let output = env.run_command(&format!("rm -f {}", shell_quote(&path))).await?;
                if output.success() {
                    format!("Successfully deleted tool: `{name}`.")
                } else {
                    format!("Failed to delete tool: `{name}`. {}", render_output(&output))
                }
            }
            PluginEdit::Test => {
                let code = extract_string_arg(&args, "test_code")?;
                let dir = plugin_dir(env);
                let test_path = format!("{dir}/tests/test_{name}.py");
                env.write_file(&test_path, &code).await?;
                let output = env
                    .run_command(&format!("cd {} && python {}", shell_quote(&dir), shell_quote(&test_path)))
                    .await?;
                if output.success() {
                    format!("The result of the tool `{name}`:\n{}", render_output(&output))
                } else {
                    format!(
                        "Failed to test the tool. The test case is not correct. The result is:\n{}",
                        render_output(&output)
                    )
                }
            }
        };
        Ok(ToolCallResult::value(text))
    }
}
