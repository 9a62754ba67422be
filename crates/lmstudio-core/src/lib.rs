//! lmstudio-core: protocol adapter for a local LM Studio server
//!
//! Provides:
//! - Configuration loading (lmstudio.toml + environment)
//! - HTTP transport for the chat, completion, embedding and model endpoints
//! - SSE frame decoding and response normalization (streaming and not)
//! - Thinking-block separation and tool-call extraction
//! - Model discovery with a once-per-process cache

pub mod client;
pub mod config;
pub mod decoder;
pub mod discovery;
pub mod embeddings;
pub mod error;
pub mod model;
pub mod normalize;
pub mod request;
pub mod thinking;
pub mod tools;
pub mod types;

pub use client::{LmStudioClient, RawHandle};
pub use config::Config;
pub use decoder::{Decoded, Frame};
pub use discovery::{
    chat_registrations, embedding_registrations, ModelCatalog, ModelInfo, ModelKind,
    ModelRegistration,
};
pub use embeddings::{Embedding, LmStudioEmbeddingModel};
pub use error::{LmStudioError, Result};
pub use model::{Completion, LmStudioModel};
pub use normalize::{NormalizedResponse, RawToolCall, StreamAccumulator};
pub use request::{Endpoint, EndpointKind, RequestPayload};
pub use thinking::ThinkingSplit;
pub use tools::ToolCallExtraction;
pub use types::{
    Conversation, Exchange, Options, Prompt, ToolCall, ToolDefinition, ToolResult, Usage,
};
