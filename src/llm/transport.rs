// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming transport
//!
//! Issues one chat completions request and forwards text deltas to a sink as
//! they arrive. A transport call is a single attempt; retries live in
//! [`crate::llm::retry`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::chat::ChunkSink;
use crate::error::{ApiError, Result};
use crate::llm::request::PreparedRequest;
use crate::llm::sse::{parse_delta, SseDecoder, SseEvent};
use crate::network::{AbortHandle, Connectivity};

/// Transport for streamed chat completions
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Run one request to completion, forwarding every text delta to `sink`
    /// in arrival order. Returns once the stream ends or `[DONE]` is seen.
    async fn stream(
        &self,
        request: &PreparedRequest,
        abort: &AbortHandle,
        sink: &dyn ChunkSink,
    ) -> Result<()>;
}

/// HTTP transport over reqwest
pub struct HttpTransport {
    client: Client,
    read_timeout: Duration,
    connectivity: Arc<dyn Connectivity>,
}

impl HttpTransport {
    pub fn new(read_timeout: Duration, connectivity: Arc<dyn Connectivity>) -> Self {
        Self::with_client(Client::new(), read_timeout, connectivity)
    }

    pub fn with_client(
        client: Client,
        read_timeout: Duration,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            client,
            read_timeout,
            connectivity,
        }
    }

    fn ensure_online(&self) -> Result<()> {
        if self.connectivity.is_online() {
            Ok(())
        } else {
            Err(ApiError::NetworkUnavailable.into())
        }
    }

    /// Await `fut` while watching the abort handle. Each `read_timeout`
    /// window that passes while online is treated as a slow server; one
    /// that passes while offline fails the read.
    async fn bounded<F: Future>(&self, fut: F, abort: &AbortHandle) -> Result<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                _ = abort.cancelled() => return Err(abort.error()),
                result = tokio::time::timeout(self.read_timeout, &mut fut) => match result {
                    Ok(output) => return Ok(output),
                    Err(_) if self.connectivity.is_online() => {
                        tracing::debug!(
                            "No data for {:?}, server is slow; still waiting",
                            self.read_timeout
                        );
                    }
                    Err(_) => return Err(ApiError::ReadTimeout(self.read_timeout).into()),
                }
            }
        }
    }

    /// Forward one decoded event. Returns true when the stream is finished.
    fn deliver(&self, event: SseEvent, abort: &AbortHandle, sink: &dyn ChunkSink) -> Result<bool> {
        let payload = match event {
            SseEvent::Done => return Ok(true),
            SseEvent::Data(payload) => payload,
        };

        match parse_delta(&payload) {
            Ok(Some(text)) => {
                abort.check()?;
                self.ensure_online()?;
                sink.on_chunk(&text);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Skipping stream event: {}", e),
        }
        Ok(false)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn stream(
        &self,
        request: &PreparedRequest,
        abort: &AbortHandle,
        sink: &dyn ChunkSink,
    ) -> Result<()> {
        abort.check()?;
        self.ensure_online()?;

        tracing::debug!(
            "POST {} (model {}, {} messages)",
            request.url,
            request.body.model,
            request.body.messages.len()
        );

        let send = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(&request.api_key)
            .json(&request.body)
            .send();
        let response = self.bounded(send, abort).await??;

        let status = response.status();
        if !status.is_success() {
            let body = self.bounded(response.text(), abort).await?.unwrap_or_default();
            let message = error_message(status.as_u16(), &body);
            tracing::debug!("Request failed with {}: {}", status, message);
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut received_bytes = false;

        loop {
            abort.check()?;
            self.ensure_online()?;

            let bytes = match self.bounded(body.next(), abort).await? {
                None => break,
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(bytes)) => bytes,
            };
            if bytes.is_empty() {
                continue;
            }
            received_bytes = true;

            for event in decoder.push(&bytes) {
                if self.deliver(event, abort, sink)? {
                    tracing::debug!("Stream finished with [DONE]");
                    return Ok(());
                }
            }
        }

        if !received_bytes {
            return Err(ApiError::NoBody.into());
        }
        if let Some(event) = decoder.finish() {
            self.deliver(event, abort, sink)?;
        }

        tracing::debug!("Stream ended without [DONE]");
        Ok(())
    }
}

/// Human-readable message for a failed response: the provider's
/// `error.message` when the body is JSON, otherwise the raw body, otherwise
/// the bare status
pub fn error_message(status: u16, body: &str) -> String {
    let fallback = format!("HTTP error! status: {}", status);

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .and_then(|v| v.as_str())
            .filter(|message| !message.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or(fallback),
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                fallback
            } else {
                trimmed.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::BufferSink;
    use crate::llm::request::ChatRequest;
    use crate::network::{AbortReason, AlwaysOnline};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Switch(AtomicBool);

    impl Connectivity for Switch {
        fn is_online(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn request(server: &MockServer) -> PreparedRequest {
        PreparedRequest {
            url: format!("{}/v1/chat/completions", server.uri()),
            api_key: "test-key".to_string(),
            body: ChatRequest {
                messages: Vec::new(),
                model: "deepseek-chat".to_string(),
                temperature: 0.5,
                top_p: 1.0,
                presence_penalty: 0.0,
                frequency_penalty: 0.0,
                stream: true,
            },
        }
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5), Arc::new(AlwaysOnline))
    }

    fn sse(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
    }

    fn recording_sink() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        (seen, move |chunk: &str| {
            seen_clone.lock().unwrap().push(chunk.to_string())
        })
    }

    #[tokio::test]
    async fn test_streams_chunks_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({"stream": true, "model": "deepseek-chat"})))
            .respond_with(sse(
                "data: {\"choices\":[{\"delta\":{\"content\":\"ab\"}}]}\n\n\
                 data: {\"choices\":[{\"delta\":{\"content\":\"cd\"}}]}\n\n\
                 data: [DONE]\n\n",
            ))
            .mount(&server)
            .await;

        let (seen, sink) = recording_sink();
        transport()
            .stream(&request(&server), &AbortHandle::new(), &sink)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["ab", "cd"]);
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse(
                "data: {oops\n\
                 data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\
                 data: [DONE]\n",
            ))
            .mount(&server)
            .await;

        let (seen, sink) = recording_sink();
        transport()
            .stream(&request(&server), &AbortHandle::new(), &sink)
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_done_sentinel_stops_reading() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse(
                "data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n\
                 data: [DONE]\n\
                 data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
            ))
            .mount(&server)
            .await;

        let sink = BufferSink::new();
        transport()
            .stream(&request(&server), &AbortHandle::new(), &sink)
            .await
            .unwrap();

        assert_eq!(sink.contents(), "first");
    }

    #[tokio::test]
    async fn test_stream_without_sentinel_flushes_last_line() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse(
                "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                 data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}",
            ))
            .mount(&server)
            .await;

        let sink = BufferSink::new();
        transport()
            .stream(&request(&server), &AbortHandle::new(), &sink)
            .await
            .unwrap();

        assert_eq!(sink.contents(), "ab");
    }

    #[tokio::test]
    async fn test_http_error_uses_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": {"message": "Invalid API key"}})),
            )
            .mount(&server)
            .await;

        let err = transport()
            .stream(&request(&server), &AbortHandle::new(), &BufferSink::new())
            .await
            .unwrap_err();

        match err.api() {
            Some(ApiError::Http { status, message }) => {
                assert_eq!(*status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("expected HTTP error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_error_with_plain_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = transport()
            .stream(&request(&server), &AbortHandle::new(), &BufferSink::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(502));
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_empty_success_body_is_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = transport()
            .stream(&request(&server), &AbortHandle::new(), &BufferSink::new())
            .await
            .unwrap_err();

        assert!(matches!(err.api(), Some(ApiError::NoBody)));
    }

    #[tokio::test]
    async fn test_aborted_handle_fails_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse("data: [DONE]\n"))
            .expect(0)
            .mount(&server)
            .await;

        let abort = AbortHandle::new();
        abort.abort(AbortReason::User);
        let err = transport()
            .stream(&request(&server), &abort, &BufferSink::new())
            .await
            .unwrap_err();

        assert!(err.is_user_abort());
    }

    #[tokio::test]
    async fn test_abort_while_waiting_for_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse("data: [DONE]\n").set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let abort = AbortHandle::new();
        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.abort(AbortReason::Disconnect);
        });

        let started = std::time::Instant::now();
        let err = transport()
            .stream(&request(&server), &abort, &BufferSink::new())
            .await
            .unwrap_err();

        assert!(err.is_connectivity_loss());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_offline_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse("data: [DONE]\n"))
            .expect(0)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(
            Duration::from_secs(5),
            Arc::new(Switch(AtomicBool::new(false))),
        );
        let err = transport
            .stream(&request(&server), &AbortHandle::new(), &BufferSink::new())
            .await
            .unwrap_err();

        assert!(matches!(err.api(), Some(ApiError::NetworkUnavailable)));
    }

    #[tokio::test]
    async fn test_slow_server_while_online_keeps_waiting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                sse("data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\ndata: [DONE]\n")
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_millis(20), Arc::new(AlwaysOnline));
        let sink = BufferSink::new();
        transport
            .stream(&request(&server), &AbortHandle::new(), &sink)
            .await
            .unwrap();

        assert_eq!(sink.contents(), "late");
    }

    #[tokio::test]
    async fn test_stall_while_offline_is_read_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse("data: [DONE]\n").set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let connectivity = Arc::new(Switch(AtomicBool::new(true)));
        let flip = connectivity.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flip.0.store(false, Ordering::SeqCst);
        });

        let transport = HttpTransport::new(Duration::from_millis(100), connectivity);
        let err = transport
            .stream(&request(&server), &AbortHandle::new(), &BufferSink::new())
            .await
            .unwrap_err();

        assert!(matches!(err.api(), Some(ApiError::ReadTimeout(_))));
        assert!(err.is_connectivity_loss());
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(
            error_message(400, r#"{"error":{"message":"bad request"}}"#),
            "bad request"
        );
        assert_eq!(error_message(400, r#"{"message":"flat"}"#), "flat");
        assert_eq!(
            error_message(500, r#"{"error":"opaque"}"#),
            "HTTP error! status: 500"
        );
        assert_eq!(error_message(503, "upstream down\n"), "upstream down");
        assert_eq!(error_message(404, ""), "HTTP error! status: 404");
    }
}
