//! OpenAiCompatUpstream -- concrete [`CompletionUpstream`] for any
//! OpenAI-compatible `/chat/completions` endpoint (DeepSeek by default).
//!
//! The response body is handed back as raw bytes; the relay in
//! `tutorlab-core` parses and forwards it.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building the `Authorization` header.

use std::time::Duration;

use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;
use tracing::field::Empty;

use tutorlab_core::relay::upstream::{ByteStream, CompletionUpstream};
use tutorlab_observe::genai_attrs;
use tutorlab_types::config::UpstreamConfig;
use tutorlab_types::error::UpstreamError;
use tutorlab_types::llm::CompletionRequest;

/// Longest error body kept from a non-2xx response.
const MAX_ERROR_BODY: usize = 512;

/// Streaming chat-completions client.
///
/// Does NOT derive Debug so the key cannot leak through `{:?}`.
pub struct OpenAiCompatUpstream {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    provider: &'static str,
}

impl OpenAiCompatUpstream {
    /// Create a client for `base_url`. A `None` key is accepted here and
    /// reported as `MissingApiKey` on the first request.
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Result<Self, UpstreamError> {
        let base_url = base_url.into();
        // No overall timeout: a completion streams for as long as the model writes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| UpstreamError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            provider: genai_attrs::provider_for_base_url(&base_url),
            base_url,
        })
    }

    pub fn from_config(config: &UpstreamConfig, api_key: Option<SecretString>) -> Result<Self, UpstreamError> {
        Self::new(config.base_url.clone(), api_key)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl CompletionUpstream for OpenAiCompatUpstream {
    async fn open(&self, request: CompletionRequest) -> Result<ByteStream, UpstreamError> {
        let Some(api_key) = &self.api_key else {
            return Err(UpstreamError::MissingApiKey);
        };

        let span = tracing::info_span!(
            "gen_ai.upstream",
            otel.name = %genai_attrs::span_name(genai_attrs::OP_CHAT, &request.model),
            "gen_ai.operation.name" = Empty,
            "gen_ai.provider.name" = Empty,
            "gen_ai.request.model" = Empty,
            "gen_ai.request.temperature" = Empty,
            "http.response.status_code" = Empty,
        );
        span.record(genai_attrs::GEN_AI_OPERATION_NAME, genai_attrs::OP_CHAT);
        span.record(genai_attrs::GEN_AI_PROVIDER_NAME, self.provider);
        span.record(genai_attrs::GEN_AI_REQUEST_MODEL, request.model.as_str());
        span.record(genai_attrs::GEN_AI_REQUEST_TEMPERATURE, request.temperature);

        let response = self
            .client
            .post(self.url())
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .instrument(span.clone())
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let status = response.status();
        span.record(genai_attrs::HTTP_RESPONSE_STATUS_CODE, status.as_u16());

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            span.in_scope(|| tracing::warn!(status = status.as_u16(), "upstream rejected completion"));
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| UpstreamError::Stream(e.to_string())));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tutorlab_types::llm::PromptMessage;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "deepseek-chat".to_string(),
            messages: vec![PromptMessage::user("hi")],
            temperature: 0.7,
            stream: true,
        }
    }

    /// One-shot HTTP server: captures the request and replies with `response`.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            // The JSON body is the last thing sent and ends with '}'.
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                if received.ends_with(b"}") {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&received).to_string()
        });
        (format!("http://{addr}/v1"), handle)
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_request() {
        let upstream = OpenAiCompatUpstream::new("http://127.0.0.1:9/v1", None).unwrap();
        assert!(!upstream.has_api_key());
        let err = upstream.open(request()).await.err().unwrap();
        assert!(matches!(err, UpstreamError::MissingApiKey));
    }

    #[test]
    fn test_url_joins_base_without_double_slash() {
        let upstream = OpenAiCompatUpstream::new("https://api.deepseek.com/v1/", None).unwrap();
        assert_eq!(upstream.url(), "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(upstream.provider, "deepseek");
    }

    #[tokio::test]
    async fn test_streams_body_and_sends_bearer_key() {
        let (base_url, server) = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n",
        )
        .await;
        let upstream =
            OpenAiCompatUpstream::new(base_url, Some(SecretString::from("sk-test".to_string()))).unwrap();

        let mut stream = upstream.open(request()).await.unwrap();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("\"content\":\"Hi\""));
        assert!(body.ends_with("data: [DONE]\n\n"));

        let received = server.await.unwrap().to_lowercase();
        assert!(received.starts_with("post /v1/chat/completions"));
        assert!(received.contains("authorization: bearer sk-test"));
        assert!(received.contains("\"stream\":true"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported_with_body() {
        let (base_url, _server) = serve_once(
            "HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: 27\r\nconnection: close\r\n\r\n{\"error\":\"invalid api key\"}",
        )
        .await;
        let upstream =
            OpenAiCompatUpstream::new(base_url, Some(SecretString::from("bad".to_string()))).unwrap();

        match upstream.open(request()).await.err().unwrap() {
            UpstreamError::Status { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("invalid api key"));
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }
}
