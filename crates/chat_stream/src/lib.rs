//! Streaming parser for rich assistant responses.
//!
//! Raw response bytes arrive as line-delimited JSON records. Their text is
//! accumulated per response and run through a [`streaming::ContentPipeline`]
//! that unwraps router envelopes, extracts artifact and tool blocks, sniffs
//! untagged JSON, holds back unfinished tags and converts BBCode to Markdown.
//! [`session::StreamCoordinator`] ties this to a chat: sending, cancelling,
//! storing the finished message and naming the chat.

pub mod config;
pub mod conversation;
pub mod logging;
pub mod persistence;
pub mod session;
pub mod streaming;
pub mod types;

pub use config::{StreamConfig, StreamOptions};
pub use session::{SessionError, StreamCoordinator, StreamEvent, StreamSession};
pub use streaming::{ContentPipeline, ParseMode, PipelineConfig};
pub use types::{MessagePart, ParseResult, StructuredPayload};
