//! Chunk sources for upstream agent responses
//!
//! The consumer reads raw response bytes through the `ChunkStream` trait so that
//! live HTTP responses and recorded playback go through identical processing.
//! Chunk boundaries carry no meaning: they may split lines, JSON records and
//! even multi-byte UTF-8 sequences.

use crate::error::TransportError;
use crate::recording::RecordedChunk;
use async_trait::async_trait;
use reqwest::Response;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trait for streaming chunk sources (real HTTP response or recorded playback)
#[async_trait]
pub trait ChunkStream: Send {
    /// Returns the next chunk of bytes, or `None` once the upstream signals end-of-stream.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

#[async_trait]
impl<S: ChunkStream + ?Sized> ChunkStream for Box<S> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).next_chunk().await
    }
}

/// Real HTTP response chunk stream
pub struct HttpChunkStream {
    response: Response,
}

impl HttpChunkStream {
    pub fn new(response: Response) -> Self {
        Self { response }
    }
}

#[async_trait]
impl ChunkStream for HttpChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.response.chunk().await {
            Ok(Some(chunk)) => Ok(Some(chunk.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(TransportError::Network(e)),
        }
    }
}

/// Recorded chunk stream for playback
pub struct PlaybackChunkStream {
    chunks: VecDeque<(Vec<u8>, u64)>,
    start_time: Option<Instant>,
    fast_mode: bool,
}

impl PlaybackChunkStream {
    /// Replays recorded chunks, honouring their timestamps unless `fast_mode` is set.
    pub fn new(chunks: Vec<RecordedChunk>, fast_mode: bool) -> Self {
        Self {
            chunks: chunks
                .into_iter()
                .map(|chunk| (chunk.data.into_bytes(), chunk.timestamp_ms))
                .collect(),
            start_time: None,
            fast_mode,
        }
    }

    /// Splits raw bytes into fixed-size chunks with no delay between them.
    ///
    /// Splitting happens at byte granularity, so a chunk may end in the middle
    /// of a UTF-8 sequence. That is intentional: live transports do the same.
    pub fn from_bytes(bytes: &[u8], chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunks: bytes
                .chunks(chunk_size)
                .map(|chunk| (chunk.to_vec(), 0))
                .collect(),
            start_time: None,
            fast_mode: true,
        }
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait]
impl ChunkStream for PlaybackChunkStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let start_time = *self.start_time.get_or_insert_with(Instant::now);

        let Some((data, timestamp_ms)) = self.chunks.pop_front() else {
            return Ok(None);
        };

        // Respect original timing unless playing back fast
        if !self.fast_mode {
            let elapsed = start_time.elapsed();
            let expected_time = Duration::from_millis(timestamp_ms);

            if elapsed < expected_time {
                tokio::time::sleep(expected_time - elapsed).await;
            }
        }

        Ok(Some(data))
    }
}
