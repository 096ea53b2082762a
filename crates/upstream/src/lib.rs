//! Transport adapters for the upstream chat agent
//!
//! This crate implements:
//! - The `ChunkStream` abstraction over raw response bytes
//! - A webhook client that opens streaming responses from the agent
//! - Recording and playback of chunk streams for debugging and testing
//!
//! It performs no parsing of the streamed content; that happens in `chat_stream`.


pub mod error;
pub mod recording;
pub mod streaming;
pub mod webhook;

pub use error::TransportError;
pub use recording::{RecordedChunk, RecordingChunkStream, RecordingSession};
pub use streaming::{ChunkStream, HttpChunkStream, PlaybackChunkStream};
pub use webhook::{HistoryEntry, WebhookClient, WebhookRequest};
