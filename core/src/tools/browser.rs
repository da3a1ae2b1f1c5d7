use crate::context::ContextVariables;
use crate::environment::web_env;
use crate::tools::{extract_string_arg, extract_string_arg_opt};
use crate::traits::{Observation, Param, Tool, ToolCallResult};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

const SCROLL_PIXELS: i32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserAction {
    VisitUrl,
    Click,
    InputText,
    PageDown,
    PageUp,
    HistoryBack,
}

impl BrowserAction {
    pub const ALL: [BrowserAction; 6] = [
        Self::VisitUrl,
        Self::Click,
        Self::InputText,
        Self::PageDown,
        Self::PageUp,
        Self::HistoryBack,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::VisitUrl => "visit_url",
            Self::Click => "click",
            Self::InputText => "input_text",
            Self::PageDown => "page_down",
            Self::PageUp => "page_up",
            Self::HistoryBack => "history_back",
        }
    }

    fn doc(self) -> &'static str {
        match self {
            Self::VisitUrl => "Navigate the browser to a URL.\n\nArgs:\n    url: The URL to open.",
            Self::Click => "Click an element of the current page.\n\nArgs:\n    bid: The element id from the accessibility tree.\n    button: Mouse button, left by default.",
            Self::InputText => "Fill a text field of the current page.\n\nArgs:\n    bid: The element id from the accessibility tree.\n    text: The text to type.",
            Self::PageDown => "Scroll the current page down by one viewport.",
            Self::PageUp => "Scroll the current page up by one viewport.",
            Self::HistoryBack => "Go back to the previous page in the browser history.",
        }
    }

    fn params(self) -> Vec<Param> {
        let mut params = match self {
            Self::VisitUrl => vec![Param::required("url", "string")],
            Self::Click => vec![
                Param::required("bid", "string"),
                Param::optional("button", "string", json!("left")),
            ],
            Self::InputText => vec![Param::required("bid", "string"), Param::required("text", "string")],
            Self::PageDown | Self::PageUp | Self::HistoryBack => vec![],
        };
        params.push(Param::context());
        params
    }

    /// Renders the call as the action string understood by the browser environment.
    fn action(self, args: &Value) -> anyhow::Result<String> {
        Ok(match self {
            Self::VisitUrl => format!("goto({})", quote(&extract_string_arg(args, "url")?)),
            Self::Click => format!(
                "click({}, button={})",
                quote(&extract_string_arg(args, "bid")?),
                quote(&extract_string_arg_opt(args, "button", "left"))
            ),
            Self::InputText => format!(
                "fill({}, {})",
                quote(&extract_string_arg(args, "bid")?),
                quote(&extract_string_arg(args, "text")?)
            ),
            Self::PageDown => format!("scroll(0, {SCROLL_PIXELS})"),
            Self::PageUp => format!("scroll(0, -{SCROLL_PIXELS})"),
            Self::HistoryBack => "go_back()".to_string(),
        })
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn error_prefix(last_action: &str) -> String {
    format!(
        "IMPORTANT! Last action is incorrect:\n{last_action}\nThink again with the current observation of the page.\n"
    )
}

fn render(observation: &Observation) -> String {
    let prefix = if observation.has_error() {
        error_prefix(&observation.last_action)
    } else {
        String::new()
    };
    format!(
        "{prefix}\n# Current Page URL:\n{}\n\n# Current Accessibility Tree:\n{}\n\nHere is an example with chain of thought of a valid action when clicking on a button:\n\"\nIn order to accomplish my goal I need to click on the button with bid 12\n```click(\"12\")```\n\"",
        observation.url, observation.axtree
    )
    .trim()
    .to_string()
}

pub struct BrowserActionTool {
    action: BrowserAction,
}

impl BrowserActionTool {
    pub fn new(action: BrowserAction) -> Self {
        Self { action }
    }

    pub fn all() -> Vec<Arc<dyn Tool>> {
        BrowserAction::ALL
            .into_iter()
            .map(|action| Arc::new(Self::new(action)) as Arc<dyn Tool>)
            .collect()
    }
}

#[async_trait]
impl Tool for BrowserActionTool {
    fn name(&self) -> &str {
        self.action.name()
    }

    fn doc(&self) -> &str {
        self.action.doc()
    }

    fn params(&self) -> Vec<Param> {
        self.action.params()
    }

    async fn execute(&self, args: Value, context: &ContextVariables) -> anyhow::Result<ToolCallResult> {
        let action = self.action.action(&args)?;
        let env = web_env(context)?;

        let observation = match env.step(&action).await {
            Ok(observation) => observation,
            Err(e) => {
                warn!(action = %action, "Browser step failed: {e:#}");
                Observation {
                    content: e.to_string(),
                    last_action: action,
                    last_action_error: e.to_string(),
                    ..Observation::default()
                }
            }
        };

        Ok(ToolCallResult::value_with_image(
            render(&observation),
            observation.screenshot.clone(),
        ))
    }
}
