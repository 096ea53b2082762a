//! Per-response streaming state
//!
//! A `StreamSession` owns the raw buffer of one assistant response. Every
//! chunk is framed into `item` records, their content is appended to the
//! buffer and the whole buffer is parsed again. Payloads are deduplicated by
//! identity so each is published exactly once.

use crate::config::{ContentStartPolicy, StreamOptions};
use crate::persistence::{assistant_parts_for_storage, StoreError};
use crate::streaming::{ContentPipeline, ParseMode};
use crate::types::{MessagePart, StructuredPayload, TextState};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, trace};

pub mod coordinator;
mod framing;
pub mod registry;


pub use coordinator::{StreamCoordinator, StreamEvent};
pub use framing::LineFramer;
pub use registry::{ChatStatus, ChatStatusRegistry};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A response is already streaming for this chat")]
    AlreadyStreaming,
    #[error("No response is streaming")]
    NotStreaming,
    #[error("Failed to store message: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Streaming,
    Done,
    Error,
}

/// What changed after a chunk was processed
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    pub display_text: String,
    /// Payloads seen for the first time in this chunk, in order
    pub new_payloads: Vec<StructuredPayload>,
    pub is_awaiting_more_input: bool,
    pub text_state: TextState,
}

/// Terminal result of a response
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub status: SessionStatus,
    pub text: String,
    pub payloads: Vec<StructuredPayload>,
}

impl StreamOutcome {
    pub fn parts(&self) -> Vec<MessagePart> {
        assistant_parts_for_storage(&self.text, &self.payloads)
    }
}

/// One line of the upstream body
#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<serde_json::Value>,
}

pub struct StreamSession {
    pipeline: Arc<ContentPipeline>,
    options: StreamOptions,
    framer: LineFramer,
    raw_buffer: String,
    display_text: String,
    text_state: TextState,
    emitted: HashSet<String>,
    payloads: Vec<StructuredPayload>,
    status: SessionStatus,
    has_content: bool,
    awaiting: bool,
}

impl StreamSession {
    pub fn new(pipeline: Arc<ContentPipeline>, options: StreamOptions) -> Self {
        Self {
            pipeline,
            options,
            framer: LineFramer::new(),
            raw_buffer: String::new(),
            display_text: String::new(),
            text_state: TextState::Done,
            emitted: HashSet::new(),
            payloads: Vec::new(),
            status: SessionStatus::Idle,
            has_content: false,
            awaiting: false,
        }
    }

    /// Start a new response, discarding anything left from the previous one
    pub fn begin(&mut self) -> Result<(), SessionError> {
        if self.status == SessionStatus::Streaming {
            return Err(SessionError::AlreadyStreaming);
        }

        self.framer = LineFramer::new();
        self.raw_buffer.clear();
        self.display_text.clear();
        self.emitted.clear();
        self.payloads.clear();
        self.has_content = false;
        self.awaiting = false;
        self.text_state = TextState::Waiting;
        self.status = SessionStatus::Streaming;
        Ok(())
    }

    /// Feed raw bytes from the transport.
    ///
    /// Returns `None` when the chunk did not complete any content record.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Result<Option<StreamUpdate>, SessionError> {
        if self.status != SessionStatus::Streaming {
            return Err(SessionError::NotStreaming);
        }

        let mut appended = false;
        for line in self.framer.push(chunk) {
            appended |= self.accept_line(&line, false);
        }

        if !appended {
            return Ok(None);
        }
        Ok(Some(self.reparse(ParseMode::Streaming)))
    }

    /// End of stream: flush, run the final pass, substitute the fallback text
    pub fn finish(&mut self) -> Result<StreamOutcome, SessionError> {
        if self.status != SessionStatus::Streaming {
            return Err(SessionError::NotStreaming);
        }

        if let Some(line) = self.framer.finish() {
            self.accept_line(&line, true);
        }
        self.reparse(ParseMode::Final);

        if self.display_text.is_empty() && self.payloads.is_empty() {
            debug!("Response ended without displayable content, using fallback");
            self.display_text = self.options.fallback_message.clone();
        }

        self.text_state = TextState::Done;
        self.status = SessionStatus::Done;
        info!(
            "Response finished: {} chars, {} payloads",
            self.display_text.len(),
            self.payloads.len()
        );
        Ok(self.outcome())
    }

    /// Transport failure: the text is replaced by `message`
    pub fn fail(&mut self, message: impl Into<String>) -> StreamOutcome {
        self.display_text = message.into();
        self.text_state = TextState::Done;
        self.status = SessionStatus::Error;
        self.awaiting = false;
        self.outcome()
    }

    /// Stop reading. Whatever was shown so far stays, marked done.
    pub fn cancel(&mut self) -> StreamOutcome {
        if self.status == SessionStatus::Streaming {
            info!("Response cancelled after {} bytes", self.raw_buffer.len());
            self.status = SessionStatus::Idle;
        }
        self.text_state = TextState::Done;
        self.awaiting = false;
        self.outcome()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn payloads(&self) -> &[StructuredPayload] {
        &self.payloads
    }

    pub fn text_state(&self) -> TextState {
        self.text_state
    }

    pub fn is_awaiting_more_input(&self) -> bool {
        self.awaiting
    }

    pub fn raw_buffer(&self) -> &str {
        &self.raw_buffer
    }

    /// Message parts as a UI would render them right now
    pub fn current_parts(&self) -> Vec<MessagePart> {
        let mut parts = vec![MessagePart::text(&self.display_text, self.text_state)];
        parts.extend(self.payloads.iter().cloned().map(MessagePart::Payload));
        parts
    }

    fn outcome(&self) -> StreamOutcome {
        StreamOutcome {
            status: self.status,
            text: self.display_text.clone(),
            payloads: self.payloads.clone(),
        }
    }

    /// Append the content of one record line. Returns whether anything was added.
    ///
    /// Skip tokens are always dropped from complete lines. For the unterminated
    /// line flushed at the end, `content_start` decides.
    fn accept_line(&mut self, line: &str, trailing: bool) -> bool {
        if line.trim().is_empty() {
            return false;
        }

        let record: StreamRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping malformed stream line ({}): {:?}", e, line);
                return false;
            }
        };
        if record.kind != "item" {
            trace!("Ignoring {} record", record.kind);
            return false;
        }
        let Some(serde_json::Value::String(content)) = record.content else {
            debug!("Skipping item record without string content");
            return false;
        };
        if content.is_empty() {
            return false;
        }

        let filter = !trailing
            || match self.options.content_start {
                ContentStartPolicy::FirstContent => !self.has_content,
                ContentStartPolicy::ReceivedContent => true,
            };
        if filter && self.options.is_skip_token(&content) {
            trace!("Dropping envelope token {:?}", content);
            return false;
        }

        trace!("Item content: {:?}", content);
        self.raw_buffer.push_str(&content);
        self.has_content = true;
        if self.text_state == TextState::Waiting {
            self.text_state = TextState::Streaming;
        }
        true
    }

    fn reparse(&mut self, mode: ParseMode) -> StreamUpdate {
        let result = self.pipeline.parse(&self.raw_buffer, mode);

        let mut new_payloads = Vec::new();
        for payload in result.payloads {
            if self.emitted.insert(payload.identity().to_string()) {
                self.payloads.push(payload.clone());
                new_payloads.push(payload);
            }
        }

        self.display_text = result.display_text;
        self.awaiting = result.is_awaiting_more_input;

        StreamUpdate {
            display_text: self.display_text.clone(),
            new_payloads,
            is_awaiting_more_input: self.awaiting,
            text_state: self.text_state,
        }
    }
}
