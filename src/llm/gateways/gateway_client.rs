//! Gateway client for OpenAI-compatible chat-completion services.
//!
//! This module provides [`GatewayClient`], which issues blocking-style,
//! background, and SSE streaming chat requests against one upstream and
//! reports every outcome through the same [`ChatResponse`] shape.

use crate::error::{GatewayError, Result};
use crate::llm::gateway::{ChatHandle, LlmClient, StreamEnd, StreamEvent, StreamHandler};
use crate::llm::gateways::config::GatewayConfig;
use crate::llm::gateways::normalizer::{describe, extract_content, normalize};
use crate::llm::gateways::request_builder::RequestBuilder;
use crate::llm::gateways::sse::StreamDecoder;
use crate::llm::models::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::{Client, Response};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EMPTY_MESSAGE: &str = "message must not be empty";

/// Client for the upstream LLM service.
///
/// Cloning is cheap: clones share the connection pool and the configuration.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    config: Arc<GatewayConfig>,
    builder: RequestBuilder,
}

impl GatewayClient {
    /// Create a client with a pooled transport using the configured
    /// connect and read timeouts.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()?;

        let config = Arc::new(config);
        let builder = RequestBuilder::new(config.clone());

        info!(
            provider = %config.provider,
            base_url = %config.base_url,
            model = %config.model,
            api_key = %config.masked_api_key(),
            "Gateway client ready"
        );

        Ok(Self {
            client,
            config,
            builder,
        })
    }

    /// Create a client from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Stream a response into a channel instead of a callback.
    ///
    /// The receiver yields the content fragments, then exactly one terminal
    /// event, then closes.
    pub fn stream_events(&self, request: &mut ChatRequest) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.chat_stream(
            request,
            Box::new(move |event: StreamEvent| {
                // Receiver gone means the caller stopped listening.
                let _ = tx.send(event);
            }),
        );
        rx
    }

    async fn post_chat_completions(&self, body: String) -> Result<Response> {
        let response = self
            .client
            .post(self.config.chat_completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;
        Ok(response)
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = self.builder.build_body(request, false)?;

        info!(base_url = %self.config.base_url, model = %self.config.model, "Sending chat completion");
        let response = self.post_chat_completions(body).await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(GatewayError::UpstreamError {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(bytes = text.len(), "Chat completion received");
        extract_content(&text)
    }

    /// Body of the background reader spawned by `chat_stream`.
    ///
    /// The response body is owned by this function, so the connection is
    /// released on every return path.
    async fn read_stream(self, request: ChatRequest, mut handler: StreamHandler) {
        if !request.has_message() {
            handler(StreamEvent::Done(StreamEnd::Failed(EMPTY_MESSAGE.to_string())));
            return;
        }

        let response = match self.open_stream(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    base_url = %self.config.base_url,
                    api_key = %self.config.masked_api_key(),
                    "Stream request failed: {}",
                    describe(&e)
                );
                handler(StreamEvent::Done(StreamEnd::Failed(describe(&e))));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Stream request rejected: {}", body);
            handler(StreamEvent::Done(StreamEnd::Rejected {
                status: status.as_u16(),
            }));
            return;
        }

        info!("Stream established, reading events");
        let mut decoder = StreamDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in decoder.feed(&bytes) {
                        let terminal = event.is_terminal();
                        handler(event);
                        if terminal {
                            info!(fragments = decoder.fragments(), "Stream completed");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        lines = decoder.lines_read(),
                        fragments = decoder.fragments(),
                        "Stream read failed: {}",
                        describe(&e)
                    );
                    handler(StreamEvent::Done(StreamEnd::Failed(describe(&e))));
                    return;
                }
            }
        }

        for event in decoder.finish() {
            handler(event);
        }
        if decoder.is_done() {
            info!(fragments = decoder.fragments(), "Stream completed");
            return;
        }
        debug!(
            lines = decoder.lines_read(),
            fragments = decoder.fragments(),
            "Stream ended without [DONE]"
        );
        handler(StreamEvent::Done(StreamEnd::EndOfStream));
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<Response> {
        let body = self.builder.build_body(request, true)?;
        info!(base_url = %self.config.base_url, model = %self.config.model, "Starting stream request");
        self.post_chat_completions(body).await
    }
}

#[async_trait]
impl LlmClient for GatewayClient {
    async fn chat(&self, request: &mut ChatRequest) -> ChatResponse {
        let session_id = request.ensure_session_id().to_string();

        if !request.has_message() {
            warn!(session_id = %session_id, "Rejecting chat request with empty message");
            return ChatResponse::error(EMPTY_MESSAGE, session_id);
        }

        let outcome = self.complete(request).await;
        if let Err(e) = &outcome {
            error!(
                base_url = %self.config.base_url,
                api_key = %self.config.masked_api_key(),
                session_id = %session_id,
                "Chat request failed: {}",
                describe(e)
            );
        }

        normalize(outcome, &session_id)
    }

    fn chat_async(&self, request: &mut ChatRequest) -> ChatHandle {
        let session_id = request.ensure_session_id().to_string();
        let mut request = request.clone();
        let client = self.clone();
        let (tx, rx) = oneshot::channel();

        let worker = tokio::spawn(async move {
            let response = client.chat(&mut request).await;
            if tx.send(response).is_err() {
                debug!("Chat handle cancelled before completion, discarding response");
            }
        });

        ChatHandle::new(session_id, rx).with_worker(worker)
    }

    fn chat_stream(&self, request: &mut ChatRequest, handler: StreamHandler) -> JoinHandle<()> {
        request.ensure_session_id();
        let request = request.clone();
        let client = self.clone();

        tokio::spawn(client.read_stream(request, handler))
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(self.config.models_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Health check rejected");
                false
            }
            Err(e) => {
                warn!(
                    base_url = %self.config.base_url,
                    api_key = %self.config.masked_api_key(),
                    "Health check failed: {}",
                    describe(&e)
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::ResponseStatus;
    use mockito::Matcher;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client_for(base_url: impl AsRef<str>) -> GatewayClient {
        let config = GatewayConfig::default()
            .with_api_key("test-key")
            .with_base_url(base_url)
            .with_model("deepseek-chat")
            .with_max_tokens(128)
            .with_temperature(0.7)
            .with_timeouts(Duration::from_secs(2), Duration::from_secs(2));
        GatewayClient::new(config).unwrap()
    }

    // Nothing listens on port 1, so connections are refused immediately.
    fn unreachable_client() -> GatewayClient {
        client_for("http://127.0.0.1:1")
    }

    fn sse_chunk(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{}\"}}}}]}}\n\n", text)
    }

    fn collecting_handler() -> (StreamHandler, Arc<Mutex<Vec<StreamEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let handler: StreamHandler = Box::new(move |event| sink.lock().unwrap().push(event));
        (handler, events)
    }

    fn content(text: &str) -> StreamEvent {
        StreamEvent::Content(text.to_string())
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = GatewayConfig::default().with_base_url("http://localhost").with_max_tokens(0);
        assert!(matches!(GatewayClient::new(config), Err(GatewayError::ConfigError(_))));
    }

    #[test]
    fn test_config_accessor() {
        let client = client_for("http://localhost:9999/");
        assert_eq!(client.config().base_url, "http://localhost:9999");
        assert_eq!(client.config().model, "deepseek-chat");
    }

    #[tokio::test]
    async fn test_chat_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "deepseek-chat",
                "max_tokens": 128,
                "stream": false
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"x = 3"}}]}"#)
            .create_async()
            .await;

        let client = client_for(server.url());
        let mut request = ChatRequest::new("Solve 2x = 6").with_session_id("session-1");

        let response = client.chat(&mut request).await;

        mock.assert_async().await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.response, "x = 3");
        assert_eq!(response.session_id, "session-1");
        assert_eq!(request.session_id.as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn test_chat_backfills_session_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"hi"}}]}"#)
            .create_async()
            .await;

        let client = client_for(server.url());
        let mut request = ChatRequest::new("hello");

        let response = client.chat(&mut request).await;

        assert!(!response.session_id.is_empty());
        assert_eq!(request.session_id.as_deref(), Some(response.session_id.as_str()));
    }

    #[tokio::test]
    async fn test_chat_upstream_rejection() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("Unauthorized")
            .create_async()
            .await;

        let client = client_for(server.url());
        let mut request = ChatRequest::new("hello").with_session_id("s1");

        let response = client.chat(&mut request).await;

        mock.assert_async().await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.response, "401 Unauthorized");
        assert_eq!(response.session_id, "s1");
    }

    #[tokio::test]
    async fn test_chat_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let client = client_for(server.url());
        let response = client.chat(&mut ChatRequest::new("hello")).await;

        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.response.starts_with("Failed to decode upstream response"));
    }

    #[tokio::test]
    async fn test_chat_transport_failure() {
        let client = unreachable_client();
        let response = client.chat(&mut ChatRequest::new("hello")).await;

        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.response.starts_with("API call failed"));
        assert!(!response.session_id.is_empty());
    }

    #[tokio::test]
    async fn test_chat_empty_message_skips_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .expect(0)
            .create_async()
            .await;

        let client = client_for(server.url());
        let response = client.chat(&mut ChatRequest::new("   ")).await;

        mock.assert_async().await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.response, EMPTY_MESSAGE);
    }

    #[tokio::test]
    async fn test_concurrent_chats_keep_pairing() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for i in 0..5 {
            let mock = server
                .mock("POST", "/chat/completions")
                .match_body(Matcher::Regex(format!(r#""content":"question-{}""#, i)))
                .with_status(200)
                .with_body(format!(r#"{{"choices":[{{"message":{{"content":"answer-{}"}}}}]}}"#, i))
                .create_async()
                .await;
            mocks.push(mock);
        }

        let client = client_for(server.url());
        let calls = (0..5).map(|i| {
            let client = client.clone();
            async move {
                let mut request =
                    ChatRequest::new(format!("question-{}", i)).with_session_id(format!("s-{}", i));
                (i, client.chat(&mut request).await)
            }
        });

        for (i, response) in futures::future::join_all(calls).await {
            assert_eq!(response.status, ResponseStatus::Success);
            assert_eq!(response.response, format!("answer-{}", i));
            assert_eq!(response.session_id, format!("s-{}", i));
        }
    }

    #[tokio::test]
    async fn test_chat_async_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"async answer"}}]}"#)
            .create_async()
            .await;

        let client = client_for(server.url());
        let mut request = ChatRequest::new("hello");

        let handle = client.chat_async(&mut request);
        assert_eq!(request.session_id.as_deref(), Some(handle.session_id()));

        let response = handle.await;
        assert!(response.is_success());
        assert_eq!(response.response, "async answer");
        assert_eq!(Some(response.session_id.as_str()), request.session_id.as_deref());
    }

    #[tokio::test]
    async fn test_chat_async_transport_failure() {
        let client = unreachable_client();
        let response = client.chat_async(&mut ChatRequest::new("hello")).await;

        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.response.starts_with("API call failed"));
    }

    #[tokio::test]
    async fn test_chat_async_cancel_lets_call_finish() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"late"}}]}"#)
            .create_async()
            .await;

        let client = client_for(server.url());
        let mut handle = client.chat_async(&mut ChatRequest::new("hello"));
        handle.cancel();

        for _ in 0..100 {
            if mock.matched_async().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        mock.assert_async().await;

        for _ in 0..100 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(handle.is_finished());
        assert!(handle.try_result().is_none());
        let response = handle.await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.response, "Chat request was cancelled");
    }

    #[tokio::test]
    async fn test_chat_stream_delivers_in_order() {
        let mut server = mockito::Server::new_async().await;
        let body = format!("{}{}data: [DONE]\n\n", sse_chunk("A"), sse_chunk("B"));
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({ "stream": true })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(server.url());
        let (handler, events) = collecting_handler();

        client.chat_stream(&mut ChatRequest::new("hello"), handler).await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            *events.lock().unwrap(),
            vec![content("A"), content("B"), StreamEvent::Done(StreamEnd::Completed)]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_nothing_after_done() {
        let mut server = mockito::Server::new_async().await;
        let body = format!("{}data: [DONE]\n\n{}", sse_chunk("A"), sse_chunk("ignored"));
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(server.url());
        let (handler, events) = collecting_handler();

        client.chat_stream(&mut ChatRequest::new("hello"), handler).await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![content("A"), StreamEvent::Done(StreamEnd::Completed)]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_skips_malformed_line() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            ": keep-alive\n\n{}data: {{broken json\n\n{}data: [DONE]\n\n",
            sse_chunk("A"),
            sse_chunk("B")
        );
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(server.url());
        let (handler, events) = collecting_handler();

        client.chat_stream(&mut ChatRequest::new("hello"), handler).await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![content("A"), content("B"), StreamEvent::Done(StreamEnd::Completed)]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_end_of_body_without_done() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(sse_chunk("only"))
            .create_async()
            .await;

        let client = client_for(server.url());
        let (handler, events) = collecting_handler();

        client.chat_stream(&mut ChatRequest::new("hello"), handler).await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![content("only"), StreamEvent::Done(StreamEnd::EndOfStream)]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_done_without_trailing_newline() {
        let mut server = mockito::Server::new_async().await;
        let body = format!("{}data: [DONE]", sse_chunk("A"));
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(server.url());
        let (handler, events) = collecting_handler();

        client.chat_stream(&mut ChatRequest::new("hello"), handler).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(*events, vec![content("A"), StreamEvent::Done(StreamEnd::Completed)]);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_chat_stream_connection_dropped_mid_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let upstream = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Read until the whole JSON payload has arrived; it ends with the stream flag.
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            while !String::from_utf8_lossy(&received).contains(r#""stream":true}"#) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }

            let head = "HTTP/1.1 200 OK\r\n\
                        Content-Type: text/event-stream\r\n\
                        Content-Length: 4096\r\n\r\n";
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(sse_chunk("partial").as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            // Dropping the socket closes it well short of the promised length.
        });

        let client = client_for(format!("http://{}", addr));
        let (handler, events) = collecting_handler();

        client.chat_stream(&mut ChatRequest::new("hello"), handler).await.unwrap();
        upstream.await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], content("partial"));
        assert!(matches!(events[1], StreamEvent::Done(StreamEnd::Failed(_))));
    }

    #[tokio::test]
    async fn test_chat_stream_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body(sse_chunk("should not be read"))
            .create_async()
            .await;

        let client = client_for(server.url());
        let (handler, events) = collecting_handler();

        client.chat_stream(&mut ChatRequest::new("hello"), handler).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(*events, vec![StreamEvent::Done(StreamEnd::Rejected { status: 500 })]);
        assert_eq!(events[0].fragment(), "");
    }

    #[tokio::test]
    async fn test_chat_stream_transport_failure() {
        let client = unreachable_client();
        let (handler, events) = collecting_handler();

        client.chat_stream(&mut ChatRequest::new("hello"), handler).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Done(StreamEnd::Failed(_))));
    }

    #[tokio::test]
    async fn test_chat_stream_backfills_session_id() {
        let client = unreachable_client();
        let (handler, _events) = collecting_handler();
        let mut request = ChatRequest::new("hello");

        let reader = client.chat_stream(&mut request, handler);

        assert!(request.session_id.is_some());
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_events_channel() {
        let mut server = mockito::Server::new_async().await;
        let body = format!("{}{}data: [DONE]\n\n", sse_chunk("x"), sse_chunk("y"));
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(server.url());
        let mut rx = client.stream_events(&mut ChatRequest::new("hello"));

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }

        assert_eq!(
            received,
            vec![content("x"), content("y"), StreamEvent::Done(StreamEnd::Completed)]
        );
    }

    #[tokio::test]
    async fn test_health_check_success_ignores_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/models")
            .match_header("authorization", "Bearer test-key")
            .with_status(204)
            .with_body("")
            .create_async()
            .await;

        let client = client_for(server.url());
        assert!(client.health_check().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health_check_non_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/models")
            .with_status(503)
            .create_async()
            .await;

        let client = client_for(server.url());
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        assert!(!unreachable_client().health_check().await);
    }
}
