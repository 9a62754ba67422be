//! Server-sent-event frame decoding.
//!
//! Streaming bodies arrive as `data: {...}` lines terminated by `data: [DONE]`.
//! Each line decodes to a [`Decoded`] value; malformed JSON is a
//! [`Decoded::Skip`], not an error, so one bad chunk never aborts a stream.

use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::trace;

use crate::error::{LmStudioError, Result};
use crate::request::EndpointKind;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded JSON event, tagged with the endpoint shape that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: EndpointKind,
    pub body: Value,
}

/// Outcome of decoding a single body line.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Frame(Frame),
    /// Blank line, framing noise, or an unparseable chunk
    Skip,
    /// The terminal sentinel; the stream ended normally
    Done,
}

/// Decode one line of a streaming body.
pub fn decode_line(line: &str, kind: EndpointKind) -> Decoded {
    let line = line.trim();
    if line.is_empty() {
        return Decoded::Skip;
    }

    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        trace!(line, "Ignoring non-data line");
        return Decoded::Skip;
    };

    let data = data.trim();
    if data == DONE_SENTINEL {
        return Decoded::Done;
    }
    if data.is_empty() {
        return Decoded::Skip;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(body) => Decoded::Frame(Frame { kind, body }),
        Err(e) => {
            trace!(error = %e, data, "Skipping unparseable frame");
            Decoded::Skip
        }
    }
}

/// Turn a line stream into a lazy frame stream that ends at the done sentinel.
///
/// Transport errors are passed through. A body that runs out before the
/// sentinel ends the stream with a connection error for `url`; callers that
/// stop at a finish reason never pull that far.
pub fn decode<S>(
    lines: S,
    kind: EndpointKind,
    url: impl Into<String>,
) -> impl Stream<Item = Result<Frame>>
where
    S: Stream<Item = Result<String>>,
{
    let url = url.into();

    async_stream::try_stream! {
        futures::pin_mut!(lines);
        let mut done = false;

        while let Some(line) = lines.next().await {
            match decode_line(&line?, kind) {
                Decoded::Frame(frame) => yield frame,
                Decoded::Skip => continue,
                Decoded::Done => {
                    done = true;
                    break;
                }
            }
        }

        if !done {
            Err::<(), _>(LmStudioError::connection(
                &url,
                "stream ended before [DONE] or a finish reason",
            ))?;
        }
    }
}
