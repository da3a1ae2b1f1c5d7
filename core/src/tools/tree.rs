use crate::context::ContextVariables;
use crate::environment::code_env;
use crate::tools::extract_string_arg;
use crate::traits::{Param, Tool, ToolCallResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

const SKIPPED: &[&str] = &["__pycache__", "node_modules", "target"];

#[derive(Default)]
struct Node {
    children: BTreeMap<String, Node>,
}

impl Node {
    fn insert<'a>(&mut self, parts: impl IntoIterator<Item = &'a str>) {
        let mut node = self;
        for part in parts {
            node = node.children.entry(part.to_string()).or_default();
        }
    }

    fn render(&self, prefix: &str, out: &mut String) {
        let last = self.children.len().saturating_sub(1);
        for (i, (name, child)) in self.children.iter().enumerate() {
            let (branch, indent) = if i == last { ("└── ", "    ") } else { ("├── ", "│   ") };
            out.push_str(&format!("{prefix}{branch}{name}\n"));
            child.render(&format!("{prefix}{indent}"), out);
        }
    }
}

fn hidden(part: &str) -> bool {
    part.starts_with('.') || SKIPPED.contains(&part)
}

/// Draws the files below `root` as an indented tree. Hidden entries and build
/// or cache directories are left out.
pub(crate) fn render_tree(root: &str, files: &[String]) -> String {
    let root = root.trim_end_matches('/');
    let mut tree = Node::default();
    for file in files {
        let Some(relative) = file.strip_prefix(root) else {
            continue;
        };
        let parts: Vec<&str> = relative.split('/').filter(|p| !p.is_empty()).collect();
        if parts.iter().any(|p| hidden(p)) {
            continue;
        }
        tree.insert(parts);
    }

    let mut out = format!("{root}\n");
    tree.render("", &mut out);
    out
}

pub struct CodeTreeTool;

#[async_trait]
impl Tool for CodeTreeTool {
    fn name(&self) -> &str {
        "gen_code_tree_structure"
    }

    fn doc(&self) -> &str {
        "Show the tree structure of the code under a directory of the code environment.\n\nArgs:\n    directory: Absolute path of the directory."
    }

    fn params(&self) -> Vec<Param> {
        vec![Param::required("directory", "string"), Param::context()]
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let directory = extract_string_arg(&args, "directory")?;
        let files = code_env(context)?.list_files(&directory).await?;
        Ok(ToolCallResult::value(render_tree(&directory, &files)))
    }
}
