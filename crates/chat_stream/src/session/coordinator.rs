//! Drives one chat: sends user messages, reads the response stream and
//! stores the result.

use super::{ChatStatus, ChatStatusRegistry, SessionError, SessionStatus, StreamOutcome};
use super::{StreamSession, StreamUpdate};
use crate::config::StreamOptions;
use crate::conversation::{Conversation, OutgoingMessage};
use crate::persistence::{build_chat_title, MessageStore};
use crate::streaming::ContentPipeline;
use crate::types::{ChatMessage, Role};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use upstream::{ChunkStream, WebhookClient};

/// Published while a response is being read
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Update(StreamUpdate),
    Finished(StreamOutcome),
}

pub struct StreamCoordinator {
    conversation: Conversation,
    session: StreamSession,
    store: Arc<dyn MessageStore>,
    title_client: Option<WebhookClient>,
    has_title: bool,
}

impl StreamCoordinator {
    pub fn new(
        conversation: Conversation,
        pipeline: Arc<ContentPipeline>,
        options: StreamOptions,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            conversation,
            session: StreamSession::new(pipeline, options),
            store,
            title_client: None,
            has_title: false,
        }
    }

    /// Ask this webhook for chat titles instead of deriving them locally
    pub fn with_title_client(mut self, client: WebhookClient) -> Self {
        self.title_client = Some(client);
        self
    }

    /// Mark the chat as already titled
    pub fn with_existing_title(mut self) -> Self {
        self.has_title = true;
        self
    }

    pub fn chat_id(&self) -> &str {
        self.conversation.chat_id()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Queue a user message and prepare the session for its response.
    ///
    /// Returns `None` without side effects for blank text or while a response
    /// is already streaming.
    pub async fn begin_send(&mut self, text: &str) -> Result<Option<OutgoingMessage>, SessionError> {
        if self.session.status() == SessionStatus::Streaming {
            debug!("Ignoring send while chat {} is streaming", self.chat_id());
            return Ok(None);
        }
        let Some(outgoing) = self.conversation.begin_send(text) else {
            return Ok(None);
        };

        self.session.begin()?;
        if let Err(e) = self
            .store
            .insert_message(&outgoing.chat_id, &outgoing.message)
            .await
        {
            warn!("Failed to store user message, send rolled back: {}", e);
            self.session.cancel();
            self.conversation.abandon_send(&outgoing.message.id);
            return Err(e.into());
        }
        self.ensure_title().await;
        Ok(Some(outgoing))
    }

    /// Re-send a stored user message that never got an answer
    pub async fn bootstrap_pending(&mut self) -> Result<Option<OutgoingMessage>, SessionError> {
        if self.session.status() == SessionStatus::Streaming {
            return Ok(None);
        }
        let Some(outgoing) = self.conversation.pending_bootstrap() else {
            return Ok(None);
        };

        self.session.begin()?;
        self.ensure_title().await;
        Ok(Some(outgoing))
    }

    /// Read `source` until it ends, fails or `cancel` fires.
    ///
    /// Updates are published on `events` as they happen. A finished response
    /// is stored; a failed one flags the chat in `registry`.
    pub async fn drive<S>(
        &mut self,
        source: &mut S,
        cancel: &CancellationToken,
        registry: &mut ChatStatusRegistry,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<StreamOutcome, SessionError>
    where
        S: ChunkStream + ?Sized,
    {
        if self.session.status() != SessionStatus::Streaming {
            return Err(SessionError::NotStreaming);
        }

        let chat_id = self.chat_id().to_string();
        registry.set(&chat_id, ChatStatus::Streaming);

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                chunk = source.next_chunk() => Some(chunk),
            };

            match next {
                None => break self.session.cancel(),
                Some(Ok(Some(bytes))) => {
                    if let Some(update) = self.session.push_bytes(&bytes)? {
                        // A dropped receiver only means nobody is watching
                        let _ = events.send(StreamEvent::Update(update)).await;
                    }
                }
                Some(Ok(None)) => break self.session.finish()?,
                Some(Err(e)) => {
                    warn!("Stream for chat {} failed: {}", chat_id, e);
                    break self.session.fail(e.to_string());
                }
            }
        };

        let stored = match outcome.status {
            SessionStatus::Done => {
                registry.set(&chat_id, ChatStatus::Idle);
                let message = ChatMessage::new(Role::Assistant, outcome.parts());
                self.store.insert_message(&chat_id, &message).await
            }
            SessionStatus::Error => {
                registry.set(&chat_id, ChatStatus::Error);
                Ok(())
            }
            SessionStatus::Idle | SessionStatus::Streaming => {
                registry.set(&chat_id, ChatStatus::Idle);
                Ok(())
            }
        };

        self.conversation.complete_response(outcome.parts());
        let _ = events.send(StreamEvent::Finished(outcome.clone())).await;
        stored?;
        Ok(outcome)
    }

    /// The request could not be opened at all. Shows `message` as the reply.
    pub fn abort_send(
        &mut self,
        message: impl Into<String>,
        registry: &mut ChatStatusRegistry,
    ) -> Result<StreamOutcome, SessionError> {
        if self.session.status() != SessionStatus::Streaming {
            return Err(SessionError::NotStreaming);
        }
        let outcome = self.session.fail(message);
        registry.set(self.conversation.chat_id(), ChatStatus::Error);
        self.conversation.complete_response(outcome.parts());
        Ok(outcome)
    }

    async fn ensure_title(&mut self) {
        if self.has_title {
            return;
        }
        let chat_id = self.chat_id().to_string();
        let source = self.conversation.first_user_text().unwrap_or_default();

        let mut title = build_chat_title(&source);
        if let Some(client) = &self.title_client {
            match client.request_title(&chat_id, &source).await {
                Ok(Some(generated)) => title = generated,
                Ok(None) => debug!("Title webhook returned no title, using fallback"),
                Err(e) => warn!("Failed to generate title, using fallback: {}", e),
            }
        }

        match self.store.update_chat_title(&chat_id, &title).await {
            Ok(()) => {
                info!("Chat {} titled {:?}", chat_id, title);
                self.has_title = true;
            }
            Err(e) => warn!("Failed to store chat title: {}", e),
        }
    }
}
