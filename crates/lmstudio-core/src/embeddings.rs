//! Embedding requests against `/v1/embeddings`.

use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::client::LmStudioClient;
use crate::error::{LmStudioError, Result};
use crate::request::raw_model_id;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// An embedding model served by LM Studio.
#[derive(Debug, Clone)]
pub struct LmStudioEmbeddingModel {
    client: LmStudioClient,
    model_id: String,
}

impl LmStudioEmbeddingModel {
    pub fn new(client: LmStudioClient, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Embed every input; the result has one vector per input, in input order.
    #[instrument(skip(self, inputs), fields(model = %self.model_id, count = inputs.len()))]
    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Embedding>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": raw_model_id(&self.model_id),
            "input": inputs,
        });
        let doc = self.client.post_json("/v1/embeddings", &body).await?;
        let embeddings = parse_embeddings(&doc)?;

        if embeddings.len() != inputs.len() {
            return Err(LmStudioError::malformed(
                format!("expected {} embeddings, got {}", inputs.len(), embeddings.len()),
                &doc,
            ));
        }

        debug!(dimensions = embeddings.first().map_or(0, Vec::len), "Embedded batch");
        Ok(embeddings)
    }
}

fn parse_embeddings(doc: &Value) -> Result<Vec<Embedding>> {
    let data = doc
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| LmStudioError::malformed("missing data array", doc))?;

    let mut entries = data
        .iter()
        .enumerate()
        .map(|(position, item)| -> Result<(usize, Embedding)> {
            let index = item
                .get("index")
                .and_then(Value::as_u64)
                .map_or(position, |i| i as usize);
            let vector = item
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| LmStudioError::malformed("entry without embedding", doc))?
                .iter()
                .map(|v| {
                    v.as_f64()
                        .map(|f| f as f32)
                        .ok_or_else(|| LmStudioError::malformed("non-numeric embedding value", doc))
                })
                .collect::<Result<Embedding>>()?;
            Ok((index, vector))
        })
        .collect::<Result<Vec<_>>>()?;

    entries.sort_by_key(|(index, _)| *index);
    if entries.iter().enumerate().any(|(position, (index, _))| position != *index) {
        return Err(LmStudioError::malformed(
            "embedding indices must cover 0..n exactly once",
            doc,
        ));
    }

    Ok(entries.into_iter().map(|(_, vector)| vector).collect())
}
