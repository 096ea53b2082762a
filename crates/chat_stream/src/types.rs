use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON object carried by a payload
pub type JsonObject = Map<String, Value>;

/// Structured object extracted from the assistant stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredPayload {
    Artifact(ArtifactPayload),
    Tool(ToolPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPayload {
    /// Lower-cased artifact type, `custom` when the tag had none
    pub artifact_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub data: JsonObject,
    pub identity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    OutputAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPayload {
    /// Display type such as `tool-carousel`
    pub tool_name: String,
    pub state: ToolState,
    pub output: JsonObject,
    pub input: JsonObject,
    pub identity: String,
}

impl ToolPayload {
    pub fn new(tool_name: impl Into<String>, data: JsonObject, identity: String) -> Self {
        Self {
            tool_name: tool_name.into(),
            state: ToolState::OutputAvailable,
            output: data.clone(),
            input: data,
            identity,
        }
    }
}

impl StructuredPayload {
    pub fn identity(&self) -> &str {
        match self {
            StructuredPayload::Artifact(artifact) => &artifact.identity,
            StructuredPayload::Tool(tool) => &tool.identity,
        }
    }

    /// Shape the payload the way the chat UI expects its message parts
    pub fn to_ui_part(&self) -> Value {
        match self {
            StructuredPayload::Artifact(artifact) => {
                let mut part = json!({
                    "type": "artifact",
                    "artifactType": artifact.artifact_type,
                    "data": artifact.data,
                    "id": artifact.identity,
                    "state": "done",
                });
                if let Some(title) = &artifact.title {
                    part["title"] = json!(title);
                }
                if let Some(description) = &artifact.description {
                    part["description"] = json!(description);
                }
                part
            }
            StructuredPayload::Tool(tool) => json!({
                "type": tool.tool_name,
                "state": "output-available",
                "output": tool.output,
                "input": tool.input,
                "toolCallId": tool.identity,
            }),
        }
    }
}

/// Result of running the content pipeline over a raw buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub display_text: String,
    pub payloads: Vec<StructuredPayload>,
    pub is_awaiting_more_input: bool,
}

/// Lifecycle of the text part of an assistant message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextState {
    Waiting,
    Streaming,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    pub state: TextState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessagePart {
    Text(TextPart),
    Payload(StructuredPayload),
}

impl MessagePart {
    pub fn text(text: impl Into<String>, state: TextState) -> Self {
        MessagePart::Text(TextPart {
            text: text.into(),
            state,
        })
    }

    pub fn to_ui_json(&self) -> Value {
        match self {
            MessagePart::Text(part) => json!({
                "type": "text",
                "text": part.text,
                "state": part.state,
            }),
            MessagePart::Payload(payload) => payload.to_ui_part(),
        }
    }
}

impl Serialize for MessagePart {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_ui_json().serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id: generate_message_id(),
            role,
            parts,
            created_at: Utc::now(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![MessagePart::text(text, TextState::Done)])
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![MessagePart::text(text, TextState::Done)])
    }
}

/// Generate a short random message id such as `msg_k3x9q2ab`
pub fn generate_message_id() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("msg_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_ui_part_shape() {
        let mut data = JsonObject::new();
        data.insert("rows".to_string(), json!(3));
        let payload = StructuredPayload::Artifact(ArtifactPayload {
            artifact_type: "table".to_string(),
            title: Some("Prices".to_string()),
            description: None,
            data,
            identity: "artifact-abc".to_string(),
        });

        let part = payload.to_ui_part();
        assert_eq!(part["type"], "artifact");
        assert_eq!(part["artifactType"], "table");
        assert_eq!(part["title"], "Prices");
        assert_eq!(part["id"], "artifact-abc");
        assert_eq!(part["state"], "done");
        assert!(part.get("description").is_none());
    }

    #[test]
    fn test_tool_ui_part_shape() {
        let mut data = JsonObject::new();
        data.insert("title".to_string(), json!("Villa"));
        let payload = StructuredPayload::Tool(ToolPayload::new(
            "tool-property-card",
            data,
            "tool-123".to_string(),
        ));

        let part = payload.to_ui_part();
        assert_eq!(part["type"], "tool-property-card");
        assert_eq!(part["state"], "output-available");
        assert_eq!(part["output"]["title"], "Villa");
        assert_eq!(part["input"], part["output"]);
        assert_eq!(part["toolCallId"], "tool-123");
    }

    #[test]
    fn test_payload_kind_tag() {
        let payload = StructuredPayload::Tool(ToolPayload::new(
            "tool-carousel",
            JsonObject::new(),
            "tool-1".to_string(),
        ));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "tool");
        assert_eq!(value["toolName"], "tool-carousel");
        assert_eq!(value["state"], "output-available");
    }

    #[test]
    fn test_message_id_format() {
        let id = generate_message_id();
        assert!(id.starts_with("msg_"));
        assert_eq!(id.len(), 12);
    }
}
