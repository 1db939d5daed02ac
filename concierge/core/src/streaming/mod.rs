//! Streaming Response Handling
//!
//! ```text
//!   bytes ──▶ EventStreamDecoder ──▶ StreamEvent ──▶ ContentAggregator ──▶ ReplyBody
//!            (buffer + cursor,         (start, meta,     (text concatenated,
//!             partial reads kept)       chunk, ...)       sections replaced)
//! ```
//!
//! The decoder knows nothing about content and the aggregator knows nothing
//! about bytes, so each half is tested on its own and together for
//! stream-boundary invariance.

pub mod aggregator;
pub mod decoder;

pub use aggregator::{
    reply_from_value, ContentAggregator, ContentFormat, StreamDiagnostics, StreamFailure,
    StreamProgress,
};
pub use decoder::{EventStreamDecoder, StreamEvent, StreamEventKind, StreamPayload};
