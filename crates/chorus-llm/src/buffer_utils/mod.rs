mod buffering;
mod sse_parser;

pub use buffering::{CircularLineBuffer, MAX_LINE_LEN};
pub use sse_parser::{parse_sse_stream, SseLineParser, SseStream, DATA_PREFIX, DONE_MARKER};
