//! HTTP client for the `/chat/` completion endpoint

use async_trait::async_trait;
use chatdeck_core::config::ApiConfig;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::base::{ChatBackend, ChatReply, ChatRequest, ProviderError, ProviderResult};

/// Completion endpoint client
///
/// Every request is bounded by a client-side timeout and can be aborted
/// through the caller's cancellation token; either way the in-flight
/// transport future is dropped.
pub struct HttpChatClient {
    client: Client,
    api_base: String,
    timeout: Duration,
}

impl HttpChatClient {
    /// Create a new client for `api_base` (e.g. `http://127.0.0.1:1338`)
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            client: Client::builder()
                .http1_only() // Force HTTP/1.1 to avoid issues with some local servers
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base,
            timeout,
        }
    }

    /// Create a client from the `api` config section
    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// Full URL requests are posted to
    pub fn endpoint(&self) -> String {
        format!("{}/chat/", self.api_base)
    }

    async fn post(&self, request: &ChatRequest) -> ProviderResult<ChatReply> {
        let url = self.endpoint();
        debug!(
            "Sending chat request to {} with model {:?}",
            url, request.model
        );

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Chat endpoint returned {}: {}", status, error_text);
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        match serde_json::from_slice::<ChatReply>(&body)? {
            ChatReply::Structured(Value::Null) => Err(ProviderError::EmptyReply),
            reply => Ok(reply),
        }
    }
}

impl Default for HttpChatClient {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

#[async_trait]
impl ChatBackend for HttpChatClient {
    async fn complete(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> ProviderResult<ChatReply> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Chat request cancelled by caller");
                Err(ProviderError::Cancelled)
            }
            result = tokio::time::timeout(self.timeout, self.post(&request)) => match result {
                Ok(reply) => reply,
                Err(_) => Err(ProviderError::Timeout(self.timeout.as_millis() as u64)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Accepts connections and never answers them
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind silent listener");
        let addr = listener.local_addr().expect("get silent listener address");
        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        (format!("http://{}", addr), task)
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = HttpChatClient::new("http://127.0.0.1:1338/", Duration::from_secs(1));
        assert_eq!(client.endpoint(), "http://127.0.0.1:1338/chat/");
    }

    #[test]
    fn test_default_uses_config_defaults() {
        let client = HttpChatClient::default();
        assert_eq!(client.endpoint(), "http://127.0.0.1:1338/chat/");
        assert_eq!(client.timeout, Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn test_structured_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/")
            .match_body(Matcher::Json(json!({
                "prompt": "Test",
                "model": "default",
                "jailbreak": false,
                "web_access": true,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":"Hi there"}"#)
            .create_async()
            .await;

        let client = HttpChatClient::new(server.url(), Duration::from_secs(5));
        let mut request = ChatRequest::new("Test");
        request.model = Some("default".to_string());
        request.web_access = true;

        let reply = client
            .complete(request, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.into_content(), "Hi there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bare_string_reply() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/")
            .with_status(200)
            .with_body(r#""just text""#)
            .create_async()
            .await;

        let client = HttpChatClient::new(server.url(), Duration::from_secs(5));
        let reply = client
            .complete(ChatRequest::new("hi"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, ChatReply::Text("just text".to_string()));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = HttpChatClient::new(server.url(), Duration::from_secs(5));
        let err = client
            .complete(ChatRequest::new("hi"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Status(503)));
        assert_eq!(err.to_string(), "HTTP 503");
    }

    #[tokio::test]
    async fn test_invalid_json_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = HttpChatClient::new(server.url(), Duration::from_secs(5));
        let err = client
            .complete(ChatRequest::new("hi"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::JsonError(_)));
    }

    #[tokio::test]
    async fn test_null_body_is_empty_reply() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("null")
            .create_async()
            .await;

        let client = HttpChatClient::new(server.url(), Duration::from_secs(5));
        let err = client
            .complete(ChatRequest::new("hi"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyReply));
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpChatClient::new(format!("http://{}", addr), Duration::from_secs(5));
        let err = client
            .complete(ChatRequest::new("hi"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::HttpError(_)));
    }

    #[tokio::test]
    async fn test_timeout_aborts_request() {
        let (url, task) = silent_server().await;
        let client = HttpChatClient::new(url, Duration::from_millis(100));

        let err = client
            .complete(ChatRequest::new("hi"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(100)));
        task.abort();
    }

    #[tokio::test]
    async fn test_cancel_aborts_request() {
        let (url, task) = silent_server().await;
        let client = HttpChatClient::new(url, Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client
            .complete(ChatRequest::new("hi"), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
        canceller.await.unwrap();
        task.abort();
    }

    #[tokio::test]
    async fn test_already_cancelled_token_short_circuits() {
        let client = HttpChatClient::new("http://127.0.0.1:9", Duration::from_secs(30));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .complete(ChatRequest::new("hi"), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }
}
