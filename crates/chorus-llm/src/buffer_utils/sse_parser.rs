use futures::{Stream, StreamExt};
use std::pin::Pin;

use super::buffering::CircularLineBuffer;
use crate::error::{ChorusError, Result};

/// Prefix of every payload line in an event stream
pub const DATA_PREFIX: &str = "data: ";

/// Payload that ends a stream
pub const DONE_MARKER: &str = "[DONE]";

pub type SseStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Strategy pattern for turning SSE payloads into items
pub trait SseLineParser: Send {
    type Item: Send;

    /// Parse the payload of a `data: ` line.
    /// `None` skips the line without ending the stream.
    fn parse_data_line(&self, data: &str) -> Option<Self::Item>;

    /// Check if this payload signals end of stream
    fn is_done_marker(&self, data: &str) -> bool {
        data == DONE_MARKER
    }
}

enum LineOutcome<T> {
    Item(T),
    Skip,
    Done,
}

fn classify<P: SseLineParser>(parser: &P, line: &str) -> LineOutcome<P::Item> {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Skip;
    };

    if parser.is_done_marker(data) {
        return LineOutcome::Done;
    }

    match parser.parse_data_line(data) {
        Some(item) => LineOutcome::Item(item),
        None => {
            tracing::trace!(line = %data, "skipping unrecognized event payload");
            LineOutcome::Skip
        }
    }
}

/// Generic SSE stream parser over any byte stream.
///
/// Ends at the done marker, at the end of the byte stream, or after yielding
/// the first transport error or an over-long line error.
pub fn parse_sse_stream<S, B, E, P>(bytes: S, parser: P) -> SseStream<P::Item>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ChorusError> + Send,
    P: SseLineParser + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer = CircularLineBuffer::with_capacity(4096);
        let mut finished = false;

        'read: while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(bytes) => {
                    buffer.extend(bytes.as_ref());

                    while let Some(line) = buffer.next_line() {
                        match classify(&parser, &line) {
                            LineOutcome::Item(item) => yield Ok(item),
                            LineOutcome::Skip => {}
                            LineOutcome::Done => {
                                finished = true;
                                break 'read;
                            }
                        }
                    }

                    if let Err(e) = buffer.check_line_limit() {
                        yield Err(e);
                        finished = true;
                        break 'read;
                    }
                }
                Err(e) => {
                    yield Err(e.into());
                    finished = true;
                    break 'read;
                }
            }
        }

        if !finished {
            if let Some(line) = buffer.take_remaining() {
                if let LineOutcome::Item(item) = classify(&parser, &line) {
                    yield Ok(item);
                }
            }
        }
    })
}
