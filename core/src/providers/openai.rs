use crate::agent::ToolChoice;
use crate::traits::{ChatMessage, ChatRequest, ChatResponse, Provider, Role, ToolCall, ToolSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const SCREENSHOT_CAPTION: &str = "Here is the screenshot of the page after the last action.";

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<OpenAIContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAIContent<'a> {
    Text(&'a str),
    Parts(Vec<OpenAIContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: OpenAIImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAIImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest<'a> {
    id: &'a str,
    r#type: &'a str,
    function: OpenAIFunctionRequest<'a>,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionRequest<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAITool<'a> {
    r#type: &'a str,
    function: &'a ToolSpec,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunction {
    name: String,
    arguments: String,
}

/// Chat-completions client for OpenAI and any endpoint speaking the same
/// protocol (OpenRouter, local gateways).
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    temperature: Option<f64>,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            temperature: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn build_request<'a>(&self, request: &ChatRequest<'a>) -> OpenAIRequest<'a> {
        let tools = request.tools.map(|tools| {
            tools
                .iter()
                .map(|spec| OpenAITool {
                    r#type: "function",
                    function: spec,
                })
                .collect()
        });
        let offers_tools = request.tools.is_some();

        OpenAIRequest {
            model: request.model,
            messages: convert_messages(request.messages),
            tools,
            tool_choice: offers_tools.then_some(request.tool_choice),
            parallel_tool_calls: offers_tools.then_some(request.parallel_tool_calls),
            temperature: self.temperature,
        }
    }
}

/// Tool-result images cannot ride on tool messages, so they follow the run of
/// tool messages as one user message with image parts.
fn convert_messages(messages: &[ChatMessage]) -> Vec<OpenAIMessage<'_>> {
    let mut converted = Vec::with_capacity(messages.len());
    let mut pending_images: Vec<&str> = Vec::new();

    for message in messages {
        if message.role != Role::Tool {
            flush_images(&mut converted, &mut pending_images);
        }

        let tool_calls = message.tool_calls.as_ref().filter(|calls| !calls.is_empty()).map(|calls| {
            calls
                .iter()
                .map(|tc| OpenAIToolCallRequest {
                    id: &tc.id,
                    r#type: "function",
                    function: OpenAIFunctionRequest {
                        name: &tc.name,
                        arguments: &tc.arguments,
                    },
                })
                .collect()
        });

        let content = if tool_calls.is_some() && message.content.is_empty() {
            None
        } else {
            Some(OpenAIContent::Text(&message.content))
        };

        converted.push(OpenAIMessage {
            role: message.role.as_str(),
            content,
            tool_calls,
            tool_call_id: message.tool_call_id.as_deref(),
        });

        if message.role == Role::Tool
            && let Some(image) = &message.image
        {
            pending_images.push(image);
        }
    }
    flush_images(&mut converted, &mut pending_images);

    converted
}

fn flush_images<'a>(converted: &mut Vec<OpenAIMessage<'a>>, pending: &mut Vec<&'a str>) {
    if pending.is_empty() {
        return;
    }
    let mut parts = vec![OpenAIContentPart::Text {
        text: SCREENSHOT_CAPTION,
    }];
    parts.extend(pending.drain(..).map(|image| OpenAIContentPart::ImageUrl {
        image_url: OpenAIImageUrl {
            url: format!("data:image/png;base64,{image}"),
        },
    }));
    converted.push(OpenAIMessage {
        role: Role::User.as_str(),
        content: Some(OpenAIContent::Parts(parts)),
        tool_calls: None,
        tool_call_id: None,
    });
}

fn parse_response(response: OpenAIResponse) -> anyhow::Result<ChatResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
        .collect();

    Ok(ChatResponse {
        text: choice.message.content,
        tool_calls,
    })
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
        let body = self.build_request(&request);
        debug!(model = %request.model, messages = body.messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Chat completion error {}: {}", status, error_text));
        }

        parse_response(response.json().await?)
    }
}
