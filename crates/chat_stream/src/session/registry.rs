use std::collections::HashMap;
use tracing::debug;

/// Status of a chat as shown in a chat list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatStatus {
    #[default]
    Idle,
    Streaming,
    /// The last response failed
    Error,
}

/// Per-chat status, owned by whoever drives the streams
#[derive(Debug, Default)]
pub struct ChatStatusRegistry {
    statuses: HashMap<String, ChatStatus>,
}

impl ChatStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, chat_id: &str, status: ChatStatus) {
        debug!("Chat {} is now {:?}", chat_id, status);
        if status == ChatStatus::Idle {
            self.statuses.remove(chat_id);
        } else {
            self.statuses.insert(chat_id.to_string(), status);
        }
    }

    /// Back to idle, for example once the user has seen an error
    pub fn reset(&mut self, chat_id: &str) {
        self.set(chat_id, ChatStatus::Idle);
    }

    pub fn get(&self, chat_id: &str) -> ChatStatus {
        self.statuses.get(chat_id).copied().unwrap_or_default()
    }

    pub fn is_streaming(&self, chat_id: &str) -> bool {
        self.get(chat_id) == ChatStatus::Streaming
    }

    /// Chats whose last response failed
    pub fn needs_attention(&self) -> Vec<&str> {
        let mut chats: Vec<&str> = self
            .statuses
            .iter()
            .filter(|(_, status)| **status == ChatStatus::Error)
            .map(|(chat_id, _)| chat_id.as_str())
            .collect();
        chats.sort_unstable();
        chats
    }
}
