use crate::error::SchemaError;
use crate::traits::{Param, Tool, ToolSpec};
use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Name of the parameter through which a tool receives the live run context.
pub const CONTEXT_PARAM: &str = "context_variables";

const SCALAR_TYPES: &[&str] = &["string", "integer", "number", "boolean", "object"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParamType {
    Scalar(&'static str),
    Array(Option<&'static str>),
    Context,
}

impl ParamType {
    fn parse(ty: &str) -> Option<Self> {
        let ty = ty.trim();
        if ty == "context" {
            return Some(Self::Context);
        }
        if ty == "array" {
            return Some(Self::Array(None));
        }
        if let Some(inner) = ty.strip_prefix("array<").and_then(|s| s.strip_suffix('>')) {
            return scalar(inner.trim()).map(|s| Self::Array(Some(s)));
        }
        scalar(ty).map(Self::Scalar)
    }

    fn json_schema(&self) -> Value {
        match self {
            Self::Scalar(ty) => json!({ "type": ty }),
            Self::Array(None) => json!({ "type": "array" }),
            Self::Array(Some(item)) => json!({ "type": "array", "items": { "type": item } }),
            Self::Context => Value::Null,
        }
    }
}

fn scalar(ty: &str) -> Option<&'static str> {
    SCALAR_TYPES.iter().copied().find(|s| *s == ty)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Model-visible call schema of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSchema>,
    #[serde(skip)]
    pub takes_context: bool,
}

impl ToolSchema {
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut property = ParamType::parse(&param.ty)
                .map(|ty| ty.json_schema())
                .unwrap_or_else(|| json!({}));
            if let (Some(description), Some(obj)) = (&param.description, property.as_object_mut()) {
                obj.insert("description".into(), Value::String(description.clone()));
            }
            properties.insert(param.name.clone(), property);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.json_schema(),
        }
    }

    /// Turns the raw argument string sent by the model into the object handed to the tool.
    pub fn prepare_args(&self, raw: &str) -> anyhow::Result<Value> {
        let mut args = if raw.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(raw)
                .map_err(|e| anyhow!("arguments are not valid JSON: {e}"))?
            {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                other => bail!("arguments must be a JSON object, got {other}"),
            }
        };

        args.remove(CONTEXT_PARAM);

        for param in &self.parameters {
            if args.contains_key(&param.name) {
                continue;
            }
            match &param.default {
                Some(default) => {
                    args.insert(param.name.clone(), default.clone());
                }
                None if param.required => bail!("missing required argument '{}'", param.name),
                None => {}
            }
        }

        Ok(Value::Object(args))
    }
}

pub fn compile(tool: &dyn Tool) -> Result<ToolSchema, SchemaError> {
    compile_signature(tool.name(), tool.doc(), &tool.params())
}

pub fn compile_signature(
    name: &str,
    doc: &str,
    params: &[Param],
) -> Result<ToolSchema, SchemaError> {
    if name.trim().is_empty() {
        return Err(SchemaError::EmptyName);
    }
    let tool = name.to_string();

    let (summary, arg_docs) = parse_doc(doc);
    if summary.is_empty() {
        return Err(SchemaError::MissingDescription { tool });
    }

    let mut parameters: Vec<ParamSchema> = Vec::with_capacity(params.len());
    let mut takes_context = false;

    for param in params {
        if !is_identifier(&param.name) {
            return Err(SchemaError::InvalidParamName {
                tool,
                param: param.name.clone(),
            });
        }
        let duplicate = parameters.iter().any(|p| p.name == param.name)
            || (param.name == CONTEXT_PARAM && takes_context);
        if duplicate {
            return Err(SchemaError::DuplicateParam {
                tool,
                param: param.name.clone(),
            });
        }

        let ty = ParamType::parse(&param.ty).ok_or_else(|| SchemaError::UnsupportedType {
            tool: tool.clone(),
            param: param.name.clone(),
            ty: param.ty.clone(),
        })?;

        match (ty, param.name == CONTEXT_PARAM) {
            (ParamType::Context, true) => takes_context = true,
            (ParamType::Context, false) => {
                return Err(SchemaError::MisplacedContext {
                    tool,
                    param: param.name.clone(),
                });
            }
            (_, true) => {
                return Err(SchemaError::UnsupportedType {
                    tool,
                    param: param.name.clone(),
                    ty: param.ty.clone(),
                });
            }
            (_, false) => parameters.push(ParamSchema {
                name: param.name.clone(),
                ty: param.ty.trim().to_string(),
                required: param.default.is_none(),
                description: arg_docs.get(&param.name).cloned(),
                default: param.default.clone(),
            }),
        }
    }

    if let Some(unknown) = arg_docs
        .keys()
        .find(|documented| documented.as_str() != CONTEXT_PARAM && !parameters.iter().any(|p| &p.name == *documented))
    {
        return Err(SchemaError::UnknownDocParam {
            tool,
            param: unknown.clone(),
        });
    }

    Ok(ToolSchema {
        name: tool,
        description: summary,
        parameters,
        takes_context,
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Splits a doc string into its summary and the `Args:` entries.
fn parse_doc(doc: &str) -> (String, BTreeMap<String, String>) {
    let mut summary = Vec::new();
    let mut args = BTreeMap::new();
    let mut lines = doc.lines();

    let mut args_indent = None;
    for line in lines.by_ref() {
        let trimmed = line.trim();
        if trimmed == "Args:" || trimmed == "Arguments:" {
            args_indent = Some(indent_of(line));
            break;
        }
        summary.push(trimmed);
    }

    if let Some(args_indent) = args_indent {
        let mut entry_indent = None;
        let mut current: Option<String> = None;

        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let indent = indent_of(line);
            if indent <= args_indent {
                break;
            }

            let is_entry = entry_indent.is_none_or(|entry| indent == entry);
            match trimmed.split_once(':') {
                Some((head, rest)) if is_entry => {
                    let name = head.split_whitespace().next().unwrap_or_default();
                    entry_indent.get_or_insert(indent);
                    args.insert(name.to_string(), rest.trim().to_string());
                    current = Some(name.to_string());
                }
                _ => {
                    if let Some(text) = current.as_ref().and_then(|name| args.get_mut(name)) {
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        text.push_str(trimmed);
                    }
                }
            }
        }
    }

    let summary = summary.join("\n").trim().to_string();
    (summary, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "Run a shell command inside the sandbox.

    Args:
        command: The command line to execute.
            Runs with `sh -c`.
        timeout (integer): Seconds before giving up.
    Returns:
        The command output.";

    fn params() -> Vec<Param> {
        vec![
            Param::required("command", "string"),
            Param::optional("timeout", "integer", json!(60)),
            Param::context(),
        ]
    }

    #[test]
    fn compiles_params_and_docs() {
        let schema = compile_signature("execute_command", DOC, &params()).unwrap();

        assert_eq!(schema.description, "Run a shell command inside the sandbox.");
        assert!(schema.takes_context);
        assert_eq!(schema.parameters.len(), 2);

        let command = &schema.parameters[0];
        assert_eq!(command.name, "command");
        assert!(command.required);
        assert_eq!(
            command.description.as_deref(),
            Some("The command line to execute. Runs with `sh -c`.")
        );

        let timeout = &schema.parameters[1];
        assert!(!timeout.required);
        assert_eq!(timeout.description.as_deref(), Some("Seconds before giving up."));
    }

    #[test]
    fn context_param_is_hidden_from_json_schema() {
        let schema = compile_signature("execute_command", DOC, &params()).unwrap();
        let json = schema.json_schema();

        assert_eq!(json["required"], json!(["command"]));
        assert!(json["properties"].get(CONTEXT_PARAM).is_none());
        assert_eq!(json["properties"]["timeout"]["type"], "integer");
    }

    #[test]
    fn array_items_are_typed() {
        let schema = compile_signature(
            "tag",
            "Tag things.",
            &[Param::required("tags", "array<string>")],
        )
        .unwrap();
        assert_eq!(
            schema.json_schema()["properties"]["tags"],
            json!({"type": "array", "items": {"type": "string"}})
        );
    }

    #[test]
    fn rejects_missing_description() {
        let err = compile_signature("x", "   \n  Args:\n    a: b", &[Param::required("a", "string")])
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingDescription { tool: "x".into() });
    }

    #[test]
    fn rejects_unknown_types() {
        let err = compile_signature("x", "Does x.", &[Param::required("a", "Callable")]).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedType { ty, .. } if ty == "Callable"));
    }

    #[test]
    fn rejects_duplicates_and_misplaced_context() {
        let dup = compile_signature(
            "x",
            "Does x.",
            &[Param::required("a", "string"), Param::required("a", "integer")],
        )
        .unwrap_err();
        assert!(matches!(dup, SchemaError::DuplicateParam { .. }));

        let ctx = compile_signature("x", "Does x.", &[Param::required("ctx", "context")]).unwrap_err();
        assert!(matches!(ctx, SchemaError::MisplacedContext { .. }));
    }

    #[test]
    fn rejects_docs_for_missing_params() {
        let err = compile_signature(
            "x",
            "Does x.\n\nArgs:\n    ghost: not a real parameter",
            &[],
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownDocParam {
                tool: "x".into(),
                param: "ghost".into()
            }
        );
    }

    #[test]
    fn prepares_arguments() {
        let schema = compile_signature("execute_command", DOC, &params()).unwrap();

        let args = schema
            .prepare_args(r#"{"command": "ls", "context_variables": {"evil": true}}"#)
            .unwrap();
        assert_eq!(args, json!({"command": "ls", "timeout": 60}));

        let err = schema.prepare_args("").unwrap_err();
        assert!(err.to_string().contains("missing required argument 'command'"));

        assert!(schema.prepare_args("[1, 2]").is_err());
        assert!(schema.prepare_args("{not json").is_err());
    }
}
