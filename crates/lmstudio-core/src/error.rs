//! Error types for the LM Studio adapter.
//!
//! Every fatal condition a request can hit is one variant of [`LmStudioError`].
//! Malformed stream frames are not errors and never show up here; the frame
//! decoder drops them.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = LmStudioError> = std::result::Result<T, E>;

/// Errors that can occur while talking to the inference server.
#[derive(Debug, Clone, Error)]
pub enum LmStudioError {
    /// The server was unreachable, returned a non-2xx status, or dropped the
    /// connection mid-stream.
    #[error("LM Studio request to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    /// A response document did not contain the fields we need.
    #[error("unexpected response format from LM Studio ({reason}): {document}")]
    MalformedResponse { reason: String, document: String },

    /// A tool call's argument payload could not be decoded into a JSON object.
    #[error("tool call {name} ({id}) has malformed arguments: {reason}")]
    MalformedToolCall {
        name: String,
        id: String,
        arguments: String,
        reason: String,
    },
}

impl LmStudioError {
    pub(crate) fn connection(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        LmStudioError::Connection {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>, document: &serde_json::Value) -> Self {
        LmStudioError::MalformedResponse {
            reason: reason.into(),
            document: document.to_string(),
        }
    }

    /// True when the server could not be reached ("server unreachable").
    pub fn is_connection(&self) -> bool {
        matches!(self, LmStudioError::Connection { .. })
    }

    /// True when the server answered with something we could not interpret
    /// ("unexpected server output").
    pub fn is_unexpected_output(&self) -> bool {
        matches!(
            self,
            LmStudioError::MalformedResponse { .. } | LmStudioError::MalformedToolCall { .. }
        )
    }

    /// The captured diagnostic payload, if this error carries one.
    pub fn diagnostic_payload(&self) -> Option<&str> {
        match self {
            LmStudioError::MalformedResponse { document, .. } => Some(document),
            LmStudioError::MalformedToolCall { arguments, .. } => Some(arguments),
            LmStudioError::Connection { .. } => None,
        }
    }
}
