/// Errors raised while talking to the upstream agent
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Non-success HTTP response. Displays the response body when there is one.
    #[error("{}", status_message(.status, .body))]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Recording error: {0}")]
    Recording(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn status_message(status: &u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("Erro: {status}")
    } else {
        body.to_string()
    }
}
