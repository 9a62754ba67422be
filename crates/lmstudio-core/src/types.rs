//! Request-side and tool-loop types shared across the adapter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sampling options forwarded verbatim to the server (only the ones that are set).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling probability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum tokens to generate (-1 for no limit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,
    /// Stop sequences where generation halts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// A function the model may ask the caller to invoke.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the arguments object
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A structured function-call request extracted from a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Server-issued identifier; opaque, echoed back unchanged in the tool result
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// The caller's answer to a [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    pub tool_call_id: String,
    pub output: String,
}

impl ToolResult {
    /// Build the result for `call`, carrying its identifier over untouched
    pub fn for_call(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            name: call.name.clone(),
            tool_call_id: call.id.clone(),
            output: output.into(),
        }
    }
}

/// Token counters reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
}

/// One user turn to send to the model.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub text: String,
    pub system: Option<String>,
    pub options: Options,
    pub tools: Vec<ToolDefinition>,
    pub tool_results: Vec<ToolResult>,
    /// JSON schema the reply must conform to
    pub schema: Option<Value>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_results(mut self, results: Vec<ToolResult>) -> Self {
        self.tool_results = results;
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// A completed turn kept as context for later prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exchange {
    pub prompt: String,
    pub system: Option<String>,
    pub tool_results: Vec<ToolResult>,
    pub response_text: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Prior turns of a multi-turn chat, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub exchanges: Vec<Exchange>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }
}
