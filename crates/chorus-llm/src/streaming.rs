use futures::Stream;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::buffer_utils::{parse_sse_stream, SseLineParser, SseStream};
use crate::error::ChorusError;

/// Text fragment from one provider, tagged with the position of its
/// definition in the dispatch list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaChunk {
    pub index: usize,
    pub delta: String,

    /// Set only on the last chunk of a provider whose stream failed, and only
    /// when error reporting was requested for the dispatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeltaChunk {
    pub fn new(index: usize, delta: impl Into<String>) -> Self {
        Self {
            index,
            delta: delta.into(),
            error: None,
        }
    }

    pub fn failed(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            delta: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Pull the text delta out of one event payload.
///
/// Probes the chat completions shape (`choices[0].delta.content`, used by
/// OpenAI and Mistral) and then the Anthropic shape (`delta.text`).
/// Returns `None` for anything else, including invalid JSON.
pub fn extract_delta(data: &str) -> Option<String> {
    let event: Value = serde_json::from_str(data).ok()?;

    event
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .or_else(|| event.pointer("/delta/text").and_then(Value::as_str))
        .map(str::to_string)
}

/// Parses any provider's event payloads into text deltas
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaParser;

impl SseLineParser for DeltaParser {
    type Item = String;

    fn parse_data_line(&self, data: &str) -> Option<String> {
        extract_delta(data)
    }
}

/// Decode a byte stream into text deltas
pub fn parse_delta_stream<S, B, E>(bytes: S) -> SseStream<String>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ChorusError> + Send,
{
    parse_sse_stream(bytes, DeltaParser)
}

/// Decode a streaming HTTP response into text deltas
pub fn parse_delta_response(response: Response) -> SseStream<String> {
    parse_delta_stream(response.bytes_stream())
}
