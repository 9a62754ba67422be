//! Response normalization.
//!
//! Both endpoint shapes, streamed or not, end up as one [`NormalizedResponse`].
//! Streaming goes through [`StreamAccumulator::fold`] one frame at a time;
//! single documents go through [`finalize`].

use serde_json::Value;
use tracing::debug;

use crate::decoder::Frame;
use crate::error::{LmStudioError, Result};
use crate::request::EndpointKind;
use crate::types::Usage;

/// Tool call exactly as the server sent it, arguments still JSON-encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

/// A complete logical response.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    pub kind: EndpointKind,
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
    /// `None` for endpoint shapes that never carry tool calls
    pub tool_calls: Option<Vec<RawToolCall>>,
}

impl NormalizedResponse {
    pub fn empty(kind: EndpointKind) -> Self {
        Self {
            kind,
            text: String::new(),
            usage: None,
            finish_reason: None,
            tool_calls: match kind {
                EndpointKind::Chat => Some(Vec::new()),
                EndpointKind::Completion => None,
            },
        }
    }
}

/// Result of folding one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldStep {
    /// Text appended by this frame (possibly empty)
    pub delta: String,
    /// The frame carried a finish reason; consume nothing further
    pub finished: bool,
}

#[derive(Debug)]
struct PendingToolCall {
    index: u64,
    call: RawToolCall,
}

/// Incremental builder for a streamed response. Text is only ever appended;
/// usage is set once, from the last frame that reported it, when the response
/// is frozen by [`finish`](Self::finish).
#[derive(Debug)]
pub struct StreamAccumulator {
    response: NormalizedResponse,
    pending: Vec<PendingToolCall>,
    latest_usage: Option<Usage>,
    finished: bool,
}

impl StreamAccumulator {
    pub fn new(kind: EndpointKind) -> Self {
        Self {
            response: NormalizedResponse::empty(kind),
            pending: Vec::new(),
            latest_usage: None,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.response.text
    }

    /// Merge one frame. Frames arriving after the finish reason are ignored.
    pub fn fold(&mut self, frame: &Frame) -> FoldStep {
        if self.finished {
            return FoldStep {
                delta: String::new(),
                finished: true,
            };
        }

        let choice = frame.body.pointer("/choices/0");

        let delta = match frame.kind {
            EndpointKind::Chat => {
                let delta = choice.and_then(|c| c.get("delta"));
                if let Some(fragments) = delta
                    .and_then(|d| d.get("tool_calls"))
                    .and_then(Value::as_array)
                {
                    self.merge_tool_fragments(fragments);
                }
                delta
                    .and_then(|d| d.get("content"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
            }
            EndpointKind::Completion => choice
                .and_then(|c| c.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default(),
        }
        .to_string();

        self.response.text.push_str(&delta);

        if let Some(usage) = usage_from(&frame.body) {
            self.latest_usage = Some(usage);
        }

        if let Some(reason) = choice.and_then(finish_reason_from) {
            debug!(finish_reason = %reason, chars = self.response.text.len(), "Stream finished");
            self.response.finish_reason = Some(reason);
            self.finished = true;
        }

        FoldStep {
            delta,
            finished: self.finished,
        }
    }

    fn merge_tool_fragments(&mut self, fragments: &[Value]) {
        for fragment in fragments {
            let index = fragment.get("index").and_then(Value::as_u64).unwrap_or(0);
            let function = fragment.get("function");
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let arguments = function
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let id = fragment
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty());

            match self.pending.iter_mut().find(|p| p.index == index) {
                Some(pending) => {
                    pending.call.name.push_str(name);
                    pending.call.arguments.push_str(arguments);
                    if pending.call.id.is_none() {
                        pending.call.id = id.map(str::to_string);
                    }
                }
                None => self.pending.push(PendingToolCall {
                    index,
                    call: RawToolCall {
                        id: id.map(str::to_string),
                        name: name.to_string(),
                        arguments: arguments.to_string(),
                    },
                }),
            }
        }
    }

    /// Freeze the response.
    pub fn finish(mut self) -> NormalizedResponse {
        self.response.usage = self.latest_usage;
        if let Some(ref mut calls) = self.response.tool_calls {
            self.pending.sort_by_key(|p| p.index);
            calls.extend(self.pending.into_iter().map(|p| p.call));
        }
        self.response
    }
}

/// Extract a response from a single non-streaming document.
pub fn finalize(kind: EndpointKind, document: &Value) -> Result<NormalizedResponse> {
    let choice = document
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| LmStudioError::malformed("missing choices", document))?;

    let message = choice.get("message").filter(|m| m.is_object());
    let text = match (message, choice.get("text")) {
        (Some(message), _) if message.get("content").is_some() || message.get("tool_calls").is_some() => {
            message
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
        }
        (_, Some(text)) => text.as_str().unwrap_or_default(),
        _ => {
            return Err(LmStudioError::malformed(
                "first choice has neither message content nor text",
                document,
            ))
        }
    };

    let tool_calls = match kind {
        EndpointKind::Chat => Some(
            message
                .and_then(|m| m.get("tool_calls"))
                .and_then(Value::as_array)
                .map(|calls| raw_tool_calls(calls, document))
                .transpose()?
                .unwrap_or_default(),
        ),
        EndpointKind::Completion => None,
    };

    Ok(NormalizedResponse {
        kind,
        text: text.to_string(),
        usage: usage_from(document),
        finish_reason: finish_reason_from(choice),
        tool_calls,
    })
}

fn raw_tool_calls(calls: &[Value], document: &Value) -> Result<Vec<RawToolCall>> {
    calls
        .iter()
        .map(|call| -> Result<RawToolCall> {
            let function = call
                .get("function")
                .filter(|f| f.is_object())
                .ok_or_else(|| LmStudioError::malformed("tool call without function", document))?;

            let arguments = match function.get("arguments") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                // Some servers send the arguments object already decoded
                Some(other) => other.to_string(),
            };

            Ok(RawToolCall {
                id: call
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                name: function
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                arguments,
            })
        })
        .collect()
}

fn usage_from(body: &Value) -> Option<Usage> {
    let usage = body.get("usage").filter(|u| u.is_object())?;
    let count = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    Some(Usage {
        input: count("prompt_tokens"),
        output: count("completion_tokens"),
    })
}

fn finish_reason_from(choice: &Value) -> Option<String> {
    match choice.get("finish_reason")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
