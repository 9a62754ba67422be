//! LM Studio HTTP transport

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{LmStudioError, Result};
use crate::request::RequestPayload;

/// Raw body lines of a streaming response, without line terminators.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// What the server sent back for one request.
pub enum RawHandle {
    /// Streaming body, consumed once; dropping it closes the connection
    Lines(LineStream),
    /// Complete decoded JSON document
    Document(Value),
}

impl std::fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawHandle::Lines(_) => f.write_str("RawHandle::Lines(..)"),
            RawHandle::Document(doc) => f.debug_tuple("RawHandle::Document").field(doc).finish(),
        }
    }
}

/// LM Studio API client
#[derive(Debug, Clone)]
pub struct LmStudioClient {
    base_url: String,
    client: reqwest::Client,
}

impl LmStudioClient {
    /// Create a new client with no request timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, None)
    }

    /// Create a client whose requests are bounded by `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| LmStudioError::connection(&base_url, e))?;

        Ok(Self { base_url, client })
    }

    /// Create a client from the process configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_timeout(config.base_url(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Dispatch a built request. One attempt, no retries.
    pub async fn send(&self, payload: &RequestPayload) -> Result<RawHandle> {
        let url = payload.endpoint().url.clone();
        debug!(url = %url, endpoint = %payload.kind(), stream = payload.is_stream(), "Sending request");

        let resp = self
            .client
            .post(&url)
            .json(payload.body())
            .send()
            .await
            .map_err(|e| LmStudioError::connection(&url, e))?;
        let resp = check_status(&url, resp).await?;

        if payload.is_stream() {
            Ok(RawHandle::Lines(Box::pin(body_lines(url, resp))))
        } else {
            read_document(&url, resp).await.map(RawHandle::Document)
        }
    }

    pub(crate) async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        debug!(url = %url, "GET");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LmStudioError::connection(&url, e))?;
        let resp = check_status(&url, resp).await?;
        read_document(&url, resp).await
    }

    pub(crate) async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        debug!(url = %url, "POST");

        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LmStudioError::connection(&url, e))?;
        let resp = check_status(&url, resp).await?;
        read_document(&url, resp).await
    }
}

async fn check_status(url: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    warn!(url = %url, status = status.as_u16(), "Server returned error status");
    Err(LmStudioError::connection(
        url,
        format!("HTTP {status}: {}", body.trim()),
    ))
}

async fn read_document(url: &str, resp: reqwest::Response) -> Result<Value> {
    let text = resp
        .text()
        .await
        .map_err(|e| LmStudioError::connection(url, e))?;

    serde_json::from_str(&text).map_err(|e| LmStudioError::MalformedResponse {
        reason: format!("body is not JSON: {e}"),
        document: text,
    })
}

/// Split a streaming body into lines. Bytes are buffered until a newline so
/// multi-byte characters split across chunks survive intact. A read error
/// (connection dropped mid-stream) ends the sequence with a connection error.
fn body_lines(url: String, resp: reqwest::Response) -> impl Stream<Item = Result<String>> + Send {
    let mut chunks = resp.bytes_stream();

    async_stream::try_stream! {
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = chunks.next().await {
            let chunk: Bytes = chunk.map_err(|e| LmStudioError::connection(&url, e))?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                yield decode_line(&line);
            }
        }

        if !buffer.is_empty() {
            yield decode_line(&buffer);
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
