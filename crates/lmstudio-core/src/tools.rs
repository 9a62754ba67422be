//! Tool-call extraction from normalized responses.

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{LmStudioError, Result};
use crate::normalize::{NormalizedResponse, RawToolCall};
use crate::types::ToolCall;

/// What a response says about tool use.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallExtraction {
    /// The model asked for these tools to be invoked, in order
    Calls(Vec<ToolCall>),
    /// The endpoint supports tool calls but the model answered directly
    Declined,
    /// The response came from an endpoint shape that never carries tool calls
    NoToolCalls,
}

impl ToolCallExtraction {
    /// The requested calls, empty unless the model actually asked for tools
    pub fn calls(&self) -> &[ToolCall] {
        match self {
            ToolCallExtraction::Calls(calls) => calls,
            ToolCallExtraction::Declined | ToolCallExtraction::NoToolCalls => &[],
        }
    }

    pub fn has_calls(&self) -> bool {
        !self.calls().is_empty()
    }
}

/// Decode the tool calls carried by `response`.
///
/// Any call whose arguments are not a JSON object fails the whole extraction;
/// a tool cannot be invoked with arguments we could not read.
pub fn extract(response: &NormalizedResponse) -> Result<ToolCallExtraction> {
    let Some(ref raw_calls) = response.tool_calls else {
        return Ok(ToolCallExtraction::NoToolCalls);
    };

    if raw_calls.is_empty() {
        return Ok(ToolCallExtraction::Declined);
    }

    raw_calls
        .iter()
        .map(decode_call)
        .collect::<Result<Vec<_>>>()
        .map(ToolCallExtraction::Calls)
}

fn decode_call(raw: &RawToolCall) -> Result<ToolCall> {
    let id = match raw.id {
        Some(ref id) => id.clone(),
        None => {
            let id = format!("call_{}", Uuid::new_v4());
            warn!(tool = %raw.name, id = %id, "Server omitted tool call id, generated one");
            id
        }
    };

    let malformed = |reason: String| LmStudioError::MalformedToolCall {
        name: raw.name.clone(),
        id: id.clone(),
        arguments: raw.arguments.clone(),
        reason,
    };

    if raw.name.is_empty() {
        return Err(malformed("missing function name".to_string()));
    }

    // No-argument functions are sometimes sent with an empty string
    let arguments = if raw.arguments.trim().is_empty() {
        serde_json::Map::new()
    } else {
        match serde_json::from_str::<Value>(&raw.arguments) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(malformed(format!(
                    "expected a JSON object, got {}",
                    json_type(&other)
                )))
            }
            Err(e) => return Err(malformed(format!("invalid JSON: {e}"))),
        }
    };

    Ok(ToolCall {
        id,
        name: raw.name.clone(),
        arguments,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
