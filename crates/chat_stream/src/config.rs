use crate::streaming::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_FALLBACK_MESSAGE: &str = "Desculpe, não recebi uma resposta válida.";
pub const DEFAULT_GREETING_MESSAGE: &str = "Olá! Como posso ajudar você hoje?";

/// Envelope fragments the upstream streams as separate tokens
pub const DEFAULT_SKIP_TOKENS: [&str; 7] =
    ["[", "]", "bbcode", "[bbcode]", "bbcode]", "/bbcode", "[/bbcode]"];

const ENV_WEBHOOK_URL: &str = "CHAT_STREAM_WEBHOOK_URL";
const ENV_WEBHOOK_TOKEN: &str = "CHAT_STREAM_WEBHOOK_TOKEN";
const ENV_TITLE_WEBHOOK_URL: &str = "CHAT_STREAM_TITLE_WEBHOOK_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Whether skip tokens are filtered from the line left unterminated at the
/// end of a response. Complete lines are always filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStartPolicy {
    /// Only when no real content has arrived yet
    #[default]
    FirstContent,
    /// Always
    ReceivedContent,
}

/// What to do with a trailing user message that never got an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingMessagePolicy {
    /// Send it upstream again when the chat is opened
    #[default]
    AutoBootstrap,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Shown when a response ends with nothing displayable
    pub fallback_message: String,
    pub skip_tokens: Vec<String>,
    pub content_start: ContentStartPolicy,
    pub pending_message: PendingMessagePolicy,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            skip_tokens: DEFAULT_SKIP_TOKENS.iter().map(|t| t.to_string()).collect(),
            content_start: ContentStartPolicy::default(),
            pending_message: PendingMessagePolicy::default(),
        }
    }
}

impl StreamOptions {
    pub fn is_skip_token(&self, content: &str) -> bool {
        let trimmed = content.trim();
        self.skip_tokens.iter().any(|token| token == trimmed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    /// Separate webhook that names new chats
    pub title_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub pipeline: PipelineConfig,
    pub stream: StreamOptions,
    pub greeting_message: String,
    pub webhook: WebhookConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            stream: StreamOptions::default(),
            greeting_message: DEFAULT_GREETING_MESSAGE.to_string(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// Get the path to the configuration file
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".config").join("chat-stream").join("config.json"))
}

/// Load the config from its default location, then apply environment overrides
pub fn load_config() -> Result<StreamConfig, ConfigError> {
    let mut config = load_config_from(&get_config_path()?)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Load a config file. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<StreamConfig, ConfigError> {
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(StreamConfig::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Override webhook settings from the environment. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut StreamConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = get(ENV_WEBHOOK_URL) {
        config.webhook.url = Some(url);
    }
    if let Some(token) = get(ENV_WEBHOOK_TOKEN) {
        config.webhook.token = Some(token);
    }
    if let Some(url) = get(ENV_TITLE_WEBHOOK_URL) {
        config.webhook.title_url = Some(url);
    }
}
