use crate::error::TransportError;
use crate::streaming::ChunkStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Recording session that contains the original request and all chunks
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecordingSession {
    /// The request that was sent
    pub request: serde_json::Value,
    /// Timestamp of when the recording was started
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Raw chunks as received from the upstream
    pub chunks: Vec<RecordedChunk>,
}

/// Single recorded chunk with timing info
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecordedChunk {
    /// Chunk content, decoded lossily as UTF-8
    pub data: String,
    /// Milliseconds since recording start
    pub timestamp_ms: u64,
}

/// Load all recording sessions stored in a file
pub fn load_recordings<P: AsRef<Path>>(path: P) -> Result<Vec<RecordingSession>, TransportError> {
    let contents = std::fs::read_to_string(path)?;
    let sessions: Vec<RecordingSession> = serde_json::from_str(&contents)?;
    Ok(sessions)
}

/// Append a session to the recording file, creating the file if needed.
pub fn append_recording<P: AsRef<Path>>(
    path: P,
    session: RecordingSession,
) -> Result<(), TransportError> {
    let path = path.as_ref();
    let mut sessions = if path.exists() {
        load_recordings(path)?
    } else {
        Vec::new()
    };
    sessions.push(session);

    let json = serde_json::to_string_pretty(&sessions)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Wraps a chunk stream and records every chunk it yields.
///
/// The recording is written when the inner stream reports end-of-stream.
/// Transport errors end the recording without saving it.
///
/// Recorded chunks always end on a UTF-8 character boundary: bytes of a
/// sequence split by the transport are carried over to the next chunk.
pub struct RecordingChunkStream<S> {
    inner: S,
    path: PathBuf,
    session: Option<RecordingSession>,
    start_time: Instant,
    /// Leading bytes of a character whose rest has not arrived yet
    carry: Vec<u8>,
}

impl<S: ChunkStream> RecordingChunkStream<S> {
    pub fn new(inner: S, path: impl Into<PathBuf>, request: serde_json::Value) -> Self {
        Self {
            inner,
            path: path.into(),
            session: Some(RecordingSession {
                request,
                timestamp: chrono::Utc::now(),
                chunks: Vec::new(),
            }),
            start_time: Instant::now(),
            carry: Vec::new(),
        }
    }

    fn record(&mut self, data: String) {
        if data.is_empty() {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.chunks.push(RecordedChunk {
                data,
                timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            });
        }
    }
}

/// Decode `bytes`, keeping an incomplete trailing sequence in `carry`.
///
/// Bytes that are invalid rather than incomplete are replaced with U+FFFD.
fn take_complete_chars(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);
    let complete = match std::str::from_utf8(&carry[..]) {
        Ok(_) => carry.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => carry.len(),
    };
    let rest = carry.split_off(complete);
    let data = String::from_utf8_lossy(&carry[..]).into_owned();
    *carry = rest;
    data
}

#[async_trait]
impl<S: ChunkStream> ChunkStream for RecordingChunkStream<S> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let result = self.inner.next_chunk().await;

        match &result {
            Ok(Some(chunk)) => {
                let data = take_complete_chars(&mut self.carry, chunk);
                self.record(data);
            }
            Ok(None) => {
                let rest = String::from_utf8_lossy(&std::mem::take(&mut self.carry)).into_owned();
                self.record(rest);
                if let Some(session) = self.session.take() {
                    debug!(
                        "Saving recording with {} chunks to {}",
                        session.chunks.len(),
                        self.path.display()
                    );
                    append_recording(&self.path, session)?;
                }
            }
            Err(e) => {
                warn!("Discarding recording after transport error: {}", e);
                self.session = None;
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_character_is_carried_over() {
        let bytes = "olá".as_bytes();
        let mut carry = Vec::new();
        assert_eq!(take_complete_chars(&mut carry, &bytes[..3]), "ol");
        assert_eq!(carry, vec![0xC3]);
        assert_eq!(take_complete_chars(&mut carry, &bytes[3..]), "á");
        assert!(carry.is_empty());
    }

    #[test]
    fn test_invalid_bytes_are_not_held_back() {
        let mut carry = Vec::new();
        assert_eq!(take_complete_chars(&mut carry, b"a\xFFb"), "a\u{FFFD}b");
        assert!(carry.is_empty());
    }
}
