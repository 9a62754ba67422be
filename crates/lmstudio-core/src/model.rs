//! End-to-end prompt execution against a chat/completion model.

use futures::StreamExt;
use tracing::{debug, instrument};

use crate::client::{LmStudioClient, RawHandle};
use crate::decoder::decode;
use crate::error::Result;
use crate::normalize::{finalize, NormalizedResponse, StreamAccumulator};
use crate::request::RequestPayload;
use crate::thinking::{split, ThinkingSplit};
use crate::tools::{extract, ToolCallExtraction};
use crate::types::{Conversation, Exchange, Prompt};

/// Everything derived from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub response: NormalizedResponse,
    pub thinking: ThinkingSplit,
    pub tool_calls: ToolCallExtraction,
}

impl Completion {
    /// The answer with thinking blocks removed
    pub fn text(&self) -> &str {
        &self.thinking.visible
    }

    /// The complete raw text, thinking blocks included
    pub fn full_text(&self) -> &str {
        &self.response.text
    }

    /// Record this turn so it can be replayed as context for the next prompt
    pub fn to_exchange(&self, prompt: &Prompt) -> Exchange {
        Exchange {
            prompt: prompt.text.clone(),
            system: prompt.system.clone(),
            tool_results: prompt.tool_results.clone(),
            response_text: self.response.text.clone(),
            tool_calls: self.tool_calls.calls().to_vec(),
        }
    }
}

/// A text-generation model served by LM Studio.
#[derive(Debug, Clone)]
pub struct LmStudioModel {
    client: LmStudioClient,
    model_id: String,
}

impl LmStudioModel {
    pub fn new(client: LmStudioClient, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn build_request(
        &self,
        prompt: &Prompt,
        conversation: Option<&Conversation>,
        stream: bool,
    ) -> Result<RequestPayload> {
        RequestPayload::build(self.client.base_url(), &self.model_id, prompt, conversation, stream)
    }

    /// Run one prompt to completion.
    ///
    /// When streaming, `on_delta` sees every non-empty text delta as it
    /// arrives. Either a complete [`Completion`] comes back or an error does.
    #[instrument(skip_all, fields(model = %self.model_id, stream = stream))]
    pub async fn execute<F>(
        &self,
        prompt: &Prompt,
        conversation: Option<&Conversation>,
        stream: bool,
        mut on_delta: F,
    ) -> Result<Completion>
    where
        F: FnMut(&str),
    {
        let payload = self.build_request(prompt, conversation, stream)?;
        let kind = payload.kind();

        let response = match self.client.send(&payload).await? {
            RawHandle::Document(doc) => finalize(kind, &doc)?,
            RawHandle::Lines(lines) => {
                let frames = decode(lines, kind, payload.endpoint().url.as_str());
                futures::pin_mut!(frames);

                let mut acc = StreamAccumulator::new(kind);
                while let Some(frame) = frames.next().await {
                    let step = acc.fold(&frame?);
                    if !step.delta.is_empty() {
                        on_delta(&step.delta);
                    }
                    if step.finished {
                        break;
                    }
                }
                acc.finish()
            }
        };

        let thinking = split(&response.text);
        let tool_calls = extract(&response)?;
        debug!(
            endpoint = %kind,
            chars = response.text.len(),
            has_thinking = thinking.has_thinking(),
            tool_calls = tool_calls.calls().len(),
            "Completed prompt"
        );

        Ok(Completion {
            response,
            thinking,
            tool_calls,
        })
    }

    /// Non-streaming convenience wrapper around [`execute`](Self::execute)
    pub async fn prompt(&self, prompt: &Prompt, conversation: Option<&Conversation>) -> Result<Completion> {
        self.execute(prompt, conversation, false, |_| {}).await
    }
}
