use crate::error::TransportError;
use crate::streaming::HttpChunkStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One prior message, flattened to text, sent along with a new request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// Request body posted to the agent webhook
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub chat_id: String,
    pub message: String,
    pub history: Vec<HistoryEntry>,
    pub user_id: String,
    pub username: String,
}

/// Client for the agent webhook that streams line-delimited JSON back
#[derive(Clone)]
pub struct WebhookClient {
    client: Client,
    url: String,
    token: Option<String>,
}

impl WebhookClient {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post a request and hand back the response body as a chunk stream.
    ///
    /// A non-success status is turned into `TransportError::Status` carrying
    /// whatever body the upstream sent.
    pub async fn open_stream(
        &self,
        request: &WebhookRequest,
    ) -> Result<HttpChunkStream, TransportError> {
        debug!(
            "Posting message for chat {} to {} ({} history entries)",
            request.chat_id,
            self.url,
            request.history.len()
        );

        let mut builder = self.client.post(&self.url).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook error: {} {}", status, body);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(HttpChunkStream::new(response))
    }

    /// Ask a title webhook to name a chat.
    ///
    /// Accepts a bare JSON string or an object with a `title` or `output`
    /// string field. Returns `None` when the response has none of those.
    pub async fn request_title(
        &self,
        chat_id: &str,
        message: &str,
    ) -> Result<Option<String>, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "chatId": chat_id, "message": message }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = response.json().await?;
        Ok(extract_title(&data))
    }
}

fn extract_title(data: &serde_json::Value) -> Option<String> {
    if let Some(title) = data.as_str() {
        return Some(title.to_string());
    }
    ["title", "output"]
        .iter()
        .find_map(|key| data.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod title_tests {
    use super::extract_title;
    use serde_json::json;

    #[test]
    fn test_extract_title_shapes() {
        assert_eq!(extract_title(&json!("Trip to Lisbon")).as_deref(), Some("Trip to Lisbon"));
        assert_eq!(
            extract_title(&json!({"title": "Beach house"})).as_deref(),
            Some("Beach house")
        );
        assert_eq!(extract_title(&json!({"output": "Cabins"})).as_deref(), Some("Cabins"));
        assert_eq!(extract_title(&json!({"title": 3})), None);
        assert_eq!(extract_title(&json!([1, 2])), None);
    }
}
