//! Endpoint selection and request payload construction.
//!
//! The endpoint shape is decided once here and carried alongside the payload;
//! the decoder and normalizer switch on [`EndpointKind`] instead of looking at
//! the URL again.

use serde::Serialize;
use serde_json::Value;

use crate::error::{LmStudioError, Result};
use crate::types::{Conversation, Options, Prompt, ToolCall, ToolDefinition};

/// Prefix under which LM Studio models are registered
pub const MODEL_PREFIX: &str = "lmstudio/";

/// Which upstream endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// `/v1/chat/completions`, structured message list
    Chat,
    /// `/v1/completions`, flat prompt string
    Completion,
}

impl EndpointKind {
    pub fn path(self) -> &'static str {
        match self {
            EndpointKind::Chat => "/v1/chat/completions",
            EndpointKind::Completion => "/v1/completions",
        }
    }

    /// Chat is required as soon as there is anything beyond a bare prompt.
    pub fn for_prompt(prompt: &Prompt, conversation: Option<&Conversation>) -> Self {
        let has_history = conversation.is_some_and(|c| !c.is_empty());
        if has_history
            || prompt.system.is_some()
            || !prompt.tools.is_empty()
            || !prompt.tool_results.is_empty()
            || prompt.schema.is_some()
        {
            EndpointKind::Chat
        } else {
            EndpointKind::Completion
        }
    }
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointKind::Chat => write!(f, "chat"),
            EndpointKind::Completion => write!(f, "completion"),
        }
    }
}

/// The endpoint a single request is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: EndpointKind,
    pub url: String,
}

impl Endpoint {
    pub fn new(kind: EndpointKind, base_url: &str) -> Self {
        Self {
            kind,
            url: format!("{}{}", base_url.trim_end_matches('/'), kind.path()),
        }
    }
}

/// Strip the registration prefix to get the id the server knows the model by
pub fn raw_model_id(model_id: &str) -> &str {
    model_id.strip_prefix(MODEL_PREFIX).unwrap_or(model_id)
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl ChatMessage {
    fn text(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: "function",
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(tool: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        }
    }
}

/// Structured output request: the reply must be JSON matching `schema`.
#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'static str,
    strict: bool,
    schema: &'a Value,
}

impl<'a> ResponseFormat<'a> {
    fn json_schema(schema: &'a Value) -> Self {
        Self {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: "response",
                strict: true,
                schema,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(flatten)]
    options: &'a Options,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(flatten)]
    options: &'a Options,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// A fully built request: where it goes and what it carries. Never mutated
/// after construction.
#[derive(Debug, Clone)]
pub struct RequestPayload {
    endpoint: Endpoint,
    body: Value,
    stream: bool,
}

impl RequestPayload {
    /// Choose the endpoint and encode the body. Encoding failures are reported
    /// against the target URL, the same way the HTTP client reports them.
    pub fn build(
        base_url: &str,
        model_id: &str,
        prompt: &Prompt,
        conversation: Option<&Conversation>,
        stream: bool,
    ) -> Result<Self> {
        let kind = EndpointKind::for_prompt(prompt, conversation);
        let endpoint = Endpoint::new(kind, base_url);
        let model = raw_model_id(model_id);

        let body = match kind {
            EndpointKind::Chat => serde_json::to_value(ChatRequest {
                model,
                messages: build_messages(prompt, conversation),
                options: &prompt.options,
                tools: prompt.tools.iter().map(WireTool::from).collect(),
                response_format: prompt.schema.as_ref().map(ResponseFormat::json_schema),
                stream,
            }),
            EndpointKind::Completion => serde_json::to_value(CompletionRequest {
                model,
                prompt: &prompt.text,
                options: &prompt.options,
                stream,
            }),
        }
        .map_err(|e| {
            LmStudioError::connection(&endpoint.url, format!("could not encode request body: {e}"))
        })?;

        Ok(Self {
            endpoint,
            body,
            stream,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn kind(&self) -> EndpointKind {
        self.endpoint.kind
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn is_stream(&self) -> bool {
        self.stream
    }
}

fn build_messages(prompt: &Prompt, conversation: Option<&Conversation>) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    if let Some(ref system) = prompt.system {
        messages.push(ChatMessage::text("system", system));
    }

    if let Some(conversation) = conversation {
        for prev in &conversation.exchanges {
            if let Some(ref system) = prev.system {
                messages.push(ChatMessage::text("system", system));
            }
            push_tool_results(&mut messages, &prev.tool_results);
            if !prev.prompt.is_empty() || prev.tool_results.is_empty() {
                messages.push(ChatMessage::text("user", &prev.prompt));
            }
            messages.push(ChatMessage {
                role: "assistant",
                content: Some(prev.response_text.clone()),
                tool_calls: prev.tool_calls.iter().map(WireToolCall::from).collect(),
                tool_call_id: None,
                name: None,
            });
        }
    }

    push_tool_results(&mut messages, &prompt.tool_results);
    if !prompt.text.is_empty() || prompt.tool_results.is_empty() {
        messages.push(ChatMessage::text("user", &prompt.text));
    }

    messages
}

fn push_tool_results(messages: &mut Vec<ChatMessage>, results: &[crate::types::ToolResult]) {
    for result in results {
        messages.push(ChatMessage {
            role: "tool",
            content: Some(result.output.clone()),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.tool_call_id.clone()),
            name: Some(result.name.clone()),
        });
    }
}
