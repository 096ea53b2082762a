use crate::types::{ChatMessage, MessagePart, StructuredPayload, TextState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

const TITLE_MAX_CHARS: usize = 60;
const DEFAULT_CHAT_TITLE: &str = "Nova conversa";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Message store lock poisoned")]
    Poisoned,
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Storage for finished chat messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, chat_id: &str, message: &ChatMessage) -> Result<(), StoreError>;

    async fn update_chat_title(&self, chat_id: &str, title: &str) -> Result<(), StoreError>;

    async fn messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError>;
}

#[derive(Debug, Default)]
struct StoreState {
    messages: HashMap<String, Vec<ChatMessage>>,
    titles: HashMap<String, String>,
}

/// Message store kept in memory, used by the CLI and tests
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    state: Mutex<StoreState>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&self, chat_id: &str) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.titles.get(chat_id).cloned())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_message(&self, chat_id: &str, message: &ChatMessage) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        debug!("Storing message {} for chat {}", message.id, chat_id);
        state
            .messages
            .entry(chat_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn update_chat_title(&self, chat_id: &str, title: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        state.titles.insert(chat_id.to_string(), title.to_string());
        Ok(())
    }

    async fn messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.messages.get(chat_id).cloned().unwrap_or_default())
    }
}

/// Parts of a finished assistant message: the text (if any) then each payload
pub fn assistant_parts_for_storage(text: &str, payloads: &[StructuredPayload]) -> Vec<MessagePart> {
    let mut parts = Vec::with_capacity(payloads.len() + 1);
    if !text.trim().is_empty() {
        parts.push(MessagePart::text(text, TextState::Done));
    }
    parts.extend(payloads.iter().cloned().map(MessagePart::Payload));
    parts
}

/// Title for a new chat derived from its first message
pub fn build_chat_title(message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_CHAT_TITLE.to_string();
    }
    if collapsed.chars().count() <= TITLE_MAX_CHARS {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(TITLE_MAX_CHARS).collect();
    format!("{truncated}...")
}

/// Text content of a message, one line per non-empty text part
pub fn flatten_message_parts(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text(text) if !text.text.is_empty() => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
