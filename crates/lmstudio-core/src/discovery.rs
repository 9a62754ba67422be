//! Model discovery and registration.
//!
//! The model list is fetched at most once per [`ModelCatalog`]. A failed
//! fetch is remembered too, so every caller sees the same outcome.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::LmStudioClient;
use crate::error::{LmStudioError, Result};
use crate::request::MODEL_PREFIX;

/// Model entry from `GET /v1/models`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub id: String,
    /// LM Studio reports `llm`, `vlm` or `embeddings` here on newer builds
    #[serde(default, rename = "type")]
    pub model_type: Option<String>,
}

impl ModelInfo {
    pub fn is_embedding(&self) -> bool {
        self.model_type.as_deref() == Some("embeddings") || self.id.to_lowercase().contains("embed")
    }
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

/// What kind of model a registration is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Chat,
    Embedding,
}

/// A model as exposed to the host tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistration {
    /// `lmstudio/<raw id>`
    pub model_id: String,
    pub raw_id: String,
    pub aliases: Vec<String>,
    pub kind: ModelKind,
}

#[derive(Debug, Clone)]
enum CatalogState {
    Unfetched,
    Fetched(Arc<Vec<ModelInfo>>),
    Failed(LmStudioError),
}

/// Lazily-populated model list for one server.
#[derive(Debug)]
pub struct ModelCatalog {
    client: LmStudioClient,
    state: Mutex<CatalogState>,
}

impl ModelCatalog {
    pub fn new(client: LmStudioClient) -> Self {
        Self {
            client,
            state: Mutex::new(CatalogState::Unfetched),
        }
    }

    pub fn client(&self) -> &LmStudioClient {
        &self.client
    }

    /// Fetch the model list on first use; afterwards return the cached outcome.
    pub async fn models(&self) -> Result<Arc<Vec<ModelInfo>>> {
        // Held across the fetch so concurrent first callers wait for one request
        let mut state = self.state.lock().await;

        match &*state {
            CatalogState::Fetched(models) => return Ok(Arc::clone(models)),
            CatalogState::Failed(err) => return Err(err.clone()),
            CatalogState::Unfetched => {}
        }

        match self.fetch().await {
            Ok(models) => {
                info!(count = models.len(), "Discovered LM Studio models");
                let models = Arc::new(models);
                *state = CatalogState::Fetched(Arc::clone(&models));
                Ok(models)
            }
            Err(e) => {
                warn!(error = %e, "Model discovery failed");
                *state = CatalogState::Failed(e.clone());
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<ModelInfo>> {
        let doc = self.client.get_json("/v1/models").await?;
        let resp: ModelsResponse = serde_json::from_value(doc.clone())
            .map_err(|e| LmStudioError::malformed(format!("invalid model list: {e}"), &doc))?;
        debug!(count = resp.data.len(), "Fetched model list");
        Ok(resp.data)
    }
}

/// Derive the short alias for a model id: last path segment without its
/// extension. Only ids with a `/` get one.
pub fn alias_for(raw_id: &str) -> Option<String> {
    let (_, last) = raw_id.rsplit_once('/')?;
    let alias = match last.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => last,
    };
    (!alias.is_empty()).then(|| alias.to_string())
}

/// Registrations for every chat/completion model. Discovery failure is fatal here.
pub async fn chat_registrations(catalog: &ModelCatalog) -> Result<Vec<ModelRegistration>> {
    let models = catalog.models().await.map_err(|e| match e {
        LmStudioError::Connection { reason, .. } => LmStudioError::Connection {
            url: catalog.client().base_url().to_string(),
            reason: format!("could not connect to LM Studio server - {reason}"),
        },
        other => other,
    })?;

    Ok(models
        .iter()
        .filter(|m| !m.id.is_empty() && !m.is_embedding())
        .map(|m| ModelRegistration {
            model_id: format!("{MODEL_PREFIX}{}", m.id),
            raw_id: m.id.clone(),
            aliases: alias_for(&m.id).into_iter().collect(),
            kind: ModelKind::Chat,
        })
        .collect())
}

/// Registrations for embedding models. Discovery failure only logs a warning.
pub async fn embedding_registrations(catalog: &ModelCatalog) -> Vec<ModelRegistration> {
    let models = match catalog.models().await {
        Ok(models) => models,
        Err(e) => {
            warn!(error = %e, "Could not retrieve LM Studio models to find embedding models");
            return Vec::new();
        }
    };

    models
        .iter()
        .filter(|m| !m.id.is_empty() && m.is_embedding())
        .map(|m| ModelRegistration {
            model_id: format!("{MODEL_PREFIX}{}", m.id),
            raw_id: m.id.clone(),
            aliases: Vec::new(),
            kind: ModelKind::Embedding,
        })
        .collect()
}
