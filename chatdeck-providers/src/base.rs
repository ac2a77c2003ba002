//! Base trait for completion backends

use async_trait::async_trait;
use chatdeck_core::Settings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error type for backend operations
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Endpoint answered with a non-2xx status
    #[error("HTTP {0}")]
    Status(u16),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Request cancelled")]
    Cancelled,

    /// Endpoint answered with a JSON `null` body
    #[error("Response had no content")]
    EmptyReply,
}

impl ProviderError {
    /// True when the request was stopped by the caller or by the timeout
    pub fn is_aborted(&self) -> bool {
        matches!(self, ProviderError::Cancelled | ProviderError::Timeout(_))
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Body of `POST /chat/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub jailbreak: bool,
    pub web_access: bool,
}

impl ChatRequest {
    /// A bare prompt with every option off
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            jailbreak: false,
            web_access: false,
        }
    }

    /// A prompt carrying the user's model and feature toggles
    pub fn with_settings(prompt: impl Into<String>, settings: &Settings) -> Self {
        Self {
            prompt: prompt.into(),
            model: Some(settings.model.clone()),
            jailbreak: settings.jailbreak,
            web_access: settings.web_access,
        }
    }
}

/// Response body of `POST /chat/`
///
/// The endpoint answers either with a bare JSON string or with a JSON value
/// (normally an object carrying `content`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChatReply {
    Text(String),
    Structured(Value),
}

impl ChatReply {
    /// The text to show as the assistant message.
    ///
    /// A bare string is used verbatim. A structured reply yields its
    /// `content` field, or the whole value serialized when that field is
    /// missing or null. A bare `null` body never gets here; the HTTP client
    /// rejects it as [`ProviderError::EmptyReply`].
    pub fn into_content(self) -> String {
        match self {
            ChatReply::Text(text) => text,
            ChatReply::Structured(value) => match value.get("content") {
                Some(Value::String(content)) => content.clone(),
                Some(Value::Null) | None => value.to_string(),
                Some(other) => other.to_string(),
            },
        }
    }
}

/// Trait for completion backends
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one prompt and wait for the reply.
    ///
    /// Implementations must resolve with [`ProviderError::Cancelled`] soon
    /// after `cancel` fires.
    async fn complete(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> ProviderResult<ChatReply>;
}
