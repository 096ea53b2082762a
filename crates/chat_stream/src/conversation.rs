use crate::config::PendingMessagePolicy;
use crate::persistence::flatten_message_parts;
use crate::types::{ChatMessage, MessagePart, Role};
use tracing::debug;
use upstream::{HistoryEntry, WebhookRequest};

/// A user message ready to go upstream
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub chat_id: String,
    pub message: ChatMessage,
    /// Trimmed text of `message`
    pub text: String,
    /// Prior messages including this one, flattened to text
    pub history: Vec<HistoryEntry>,
    /// False when the message is already stored and only being re-sent
    pub persist_user_message: bool,
}

impl OutgoingMessage {
    pub fn to_request(&self, user_id: &str, username: &str) -> WebhookRequest {
        WebhookRequest {
            chat_id: self.chat_id.clone(),
            message: self.text.clone(),
            history: self.history.clone(),
            user_id: user_id.to_string(),
            username: username.to_string(),
        }
    }
}

/// Message list of one chat as the user sees it
pub struct Conversation {
    chat_id: String,
    messages: Vec<ChatMessage>,
    /// Id of the locally generated greeting, never sent upstream
    greeting_id: Option<String>,
    streaming: bool,
    pending_policy: PendingMessagePolicy,
}

impl Conversation {
    /// Start from stored history, or from a greeting when there is none
    pub fn new(
        chat_id: impl Into<String>,
        history: Vec<ChatMessage>,
        greeting: &str,
        pending_policy: PendingMessagePolicy,
    ) -> Self {
        let mut messages = history;
        let mut greeting_id = None;
        if messages.is_empty() {
            let greeting = ChatMessage::assistant_text(greeting);
            greeting_id = Some(greeting.id.clone());
            messages.push(greeting);
        }

        Self {
            chat_id: chat_id.into(),
            messages,
            greeting_id,
            streaming: false,
            pending_policy,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Queue a new user message. No-op on blank text or while a response streams.
    pub fn begin_send(&mut self, text: &str) -> Option<OutgoingMessage> {
        let text = text.trim();
        if text.is_empty() || self.streaming {
            return None;
        }

        let message = ChatMessage::user_text(text);
        self.messages.push(message.clone());
        self.streaming = true;
        Some(self.outgoing(message, text.to_string(), true))
    }

    /// The trailing user message that never got an answer, re-sent as is
    pub fn pending_bootstrap(&mut self) -> Option<OutgoingMessage> {
        if self.pending_policy == PendingMessagePolicy::Disabled || self.streaming {
            return None;
        }

        let last = self.messages.last().filter(|m| m.role == Role::User)?.clone();
        let text = flatten_message_parts(&last.parts).trim().to_string();
        if text.is_empty() {
            return None;
        }

        debug!("Re-sending unanswered message {} in chat {}", last.id, self.chat_id);
        self.streaming = true;
        Some(self.outgoing(last, text, false))
    }

    /// Undo a `begin_send` whose message never went out
    pub fn abandon_send(&mut self, message_id: &str) {
        if self.messages.last().is_some_and(|m| m.id == message_id) {
            self.messages.pop();
        }
        self.streaming = false;
    }

    /// Add the assistant reply and leave the streaming state
    pub fn complete_response(&mut self, parts: Vec<MessagePart>) {
        if !parts.is_empty() {
            self.messages.push(ChatMessage::new(Role::Assistant, parts));
        }
        self.streaming = false;
    }

    /// Text of the first user message, the source for a chat title
    pub fn first_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| flatten_message_parts(&m.parts))
    }

    /// History in the shape the upstream expects
    pub fn history_for_upstream(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .filter(|m| self.greeting_id.as_deref() != Some(m.id.as_str()))
            .map(|m| HistoryEntry {
                role: match m.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: flatten_message_parts(&m.parts),
            })
            .collect()
    }

    fn outgoing(&self, message: ChatMessage, text: String, persist: bool) -> OutgoingMessage {
        OutgoingMessage {
            chat_id: self.chat_id.clone(),
            message,
            text,
            history: self.history_for_upstream(),
            persist_user_message: persist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextState;

    const GREETING: &str = "Olá! Como posso ajudar você hoje?";

    #[test]
    fn test_greeting_when_no_history() {
        let conversation = Conversation::new("c1", Vec::new(), GREETING, PendingMessagePolicy::AutoBootstrap);
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.messages()[0].role, Role::Assistant);
        assert_eq!(flatten_message_parts(&conversation.messages()[0].parts), GREETING);
        // The greeting is local only
        assert!(conversation.history_for_upstream().is_empty());
    }

    #[test]
    fn test_begin_send_rules() {
        let mut conversation =
            Conversation::new("c1", Vec::new(), GREETING, PendingMessagePolicy::AutoBootstrap);

        assert!(conversation.begin_send("   ").is_none());

        let outgoing = conversation.begin_send("  Casas em Búzios ").unwrap();
        assert_eq!(outgoing.text, "Casas em Búzios");
        assert!(outgoing.persist_user_message);
        assert_eq!(outgoing.history.len(), 1);
        assert_eq!(outgoing.history[0].role, "user");
        assert!(conversation.is_streaming());

        // A send while streaming is a no-op
        assert!(conversation.begin_send("again").is_none());
        assert_eq!(conversation.messages().len(), 2);

        conversation.complete_response(vec![MessagePart::text("Claro!", TextState::Done)]);
        assert!(!conversation.is_streaming());
        assert_eq!(conversation.history_for_upstream().len(), 2);

        let request = conversation.begin_send("E no Rio?").unwrap().to_request("u1", "Ana");
        assert_eq!(request.chat_id, "c1");
        assert_eq!(request.history.len(), 3);
        assert_eq!(request.history[1].content, "Claro!");
    }

    #[test]
    fn test_abandon_send() {
        let mut conversation =
            Conversation::new("c1", Vec::new(), GREETING, PendingMessagePolicy::AutoBootstrap);
        let outgoing = conversation.begin_send("Oi").unwrap();

        conversation.abandon_send(&outgoing.message.id);
        assert!(!conversation.is_streaming());
        assert_eq!(conversation.messages().len(), 1);
        assert!(conversation.begin_send("Oi de novo").is_some());
    }

    #[test]
    fn test_pending_bootstrap() {
        let history = vec![
            ChatMessage::user_text("Oi"),
            ChatMessage::assistant_text("Olá"),
            ChatMessage::user_text("Quero uma casa"),
        ];
        let mut conversation =
            Conversation::new("c1", history.clone(), GREETING, PendingMessagePolicy::AutoBootstrap);

        let outgoing = conversation.pending_bootstrap().unwrap();
        assert_eq!(outgoing.text, "Quero uma casa");
        assert!(!outgoing.persist_user_message);
        assert_eq!(outgoing.history.len(), 3);
        // Already streaming now
        assert!(conversation.pending_bootstrap().is_none());

        let mut disabled = Conversation::new("c1", history, GREETING, PendingMessagePolicy::Disabled);
        assert!(disabled.pending_bootstrap().is_none());

        let mut answered = Conversation::new(
            "c1",
            vec![ChatMessage::user_text("Oi"), ChatMessage::assistant_text("Olá")],
            GREETING,
            PendingMessagePolicy::AutoBootstrap,
        );
        assert!(answered.pending_bootstrap().is_none());
    }
}
