//! Ready-made [`TokenLogSink`] implementations.

use async_trait::async_trait;
use spancost_core::{SinkError, TokenLog, TokenLogSink};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

// ── Console ───────────────────────────────────────────────────────────────

/// Writes each record to stdout as one JSON line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TokenLogSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn handle(&self, log: &TokenLog) -> Result<(), SinkError> {
        let line = serde_json::to_string(log).map_err(|e| SinkError::Encoding(e.to_string()))?;
        println!("{line}");
        Ok(())
    }
}

// ── Callback ──────────────────────────────────────────────────────────────

/// Hands each record to an async closure.
pub struct CallbackSink<F> {
    name: String,
    callback: F,
}

impl<F, Fut> CallbackSink<F>
where
    F: Fn(TokenLog) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SinkError>> + Send + 'static,
{
    pub fn new(callback: F) -> Self {
        Self {
            name: "callback".into(),
            callback,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<F, Fut> TokenLogSink for CallbackSink<F>
where
    F: Fn(TokenLog) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SinkError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, log: &TokenLog) -> Result<(), SinkError> {
        (self.callback)(log.clone()).await
    }
}

// ── Webhook ───────────────────────────────────────────────────────────────

const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs each record as JSON to an HTTP endpoint.
///
/// Any non-2xx response is reported as [`SinkError::Rejected`].
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        Self::with_timeout(url, DEFAULT_WEBHOOK_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Closed(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(url, client))
    }

    /// Reuse an existing client (connection pool, proxy settings).
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenLogSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn handle(&self, log: &TokenLog) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(log)
            .send()
            .await
            .map_err(|e| SinkError::DeliveryFailed {
                sink: "webhook".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                sink: "webhook".into(),
                status_code: status.as_u16(),
            });
        }

        debug!(url = %self.url, model = %log.model, "Delivered token log");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn sample() -> TokenLog {
        TokenLog {
            time: "2025-01-01T00:00:00.000Z".into(),
            provider: Some("openai.responses".into()),
            model: "gpt-4o".into(),
            input: 10,
            output: 5,
            cache_read: 0,
            cache_write: 0,
            cost_cents: Some(0.0075),
            finish_reason: None,
            user_id: None,
            workspace_id: None,
            trace_id: None,
            span_id: None,
            attributes: None,
        }
    }

    /// Accept one connection, capture the request, reply with `status`.
    async fn one_shot_server(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/logs", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some((head, body)) = text.split_once("\r\n\r\n") {
                    let length = head
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if body.len() >= length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn console_sink_accepts_records() {
        let sink = ConsoleSink::new();
        assert_eq!(sink.name(), "console");
        assert!(sink.handle(&sample()).await.is_ok());
    }

    #[tokio::test]
    async fn callback_sink_receives_clone() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&received);
        let sink = CallbackSink::new(move |log: TokenLog| {
            let store = Arc::clone(&store);
            async move {
                store.lock().unwrap().push(log.model);
                Ok(())
            }
        })
        .with_name("collector");

        sink.handle(&sample()).await.unwrap();
        assert_eq!(sink.name(), "collector");
        assert_eq!(*received.lock().unwrap(), vec!["gpt-4o".to_string()]);
    }

    #[tokio::test]
    async fn callback_sink_propagates_errors() {
        let sink = CallbackSink::new(|_log: TokenLog| async {
            Err(SinkError::Closed("queue full".into()))
        });
        assert!(matches!(
            sink.handle(&sample()).await,
            Err(SinkError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn webhook_posts_json() {
        let (url, server) = one_shot_server("204 No Content").await;
        let sink = WebhookSink::new(&url).unwrap();
        sink.handle(&sample()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /logs"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(request.contains("\"model\":\"gpt-4o\""));
    }

    #[tokio::test]
    async fn webhook_non_success_is_rejected() {
        let (url, server) = one_shot_server("500 Internal Server Error").await;
        let sink = WebhookSink::new(&url).unwrap();
        let err = sink.handle(&sample()).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected { status_code: 500, .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn webhook_unreachable_is_delivery_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let sink = WebhookSink::with_timeout(url, Duration::from_secs(2)).unwrap();
        let err = sink.handle(&sample()).await.unwrap_err();
        assert!(matches!(err, SinkError::DeliveryFailed { .. }));
    }
}
