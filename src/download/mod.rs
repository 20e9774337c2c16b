//! Resilient snapshot download
//!
//! The topology report can run to hundreds of megabytes and the server is
//! known to drop long transfers. Every attempt streams the whole body again;
//! attempts are bounded both by count and by one wall-clock budget shared by
//! all attempts and the delays between them. When nothing complete arrives,
//! the largest partial body is handed to [`recovery::recover_truncated`].

pub mod recovery;

use crate::config::DownloadConfig;
use crate::error::{Error, Result, TransportError};
use crate::retry::IsRetryable;
use crate::types::Event;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;
use tokio_util::io::StreamReader;

pub use recovery::{is_well_formed, recover_truncated};

/// A single HTTP request whose body should be streamed into memory
#[derive(Clone, Debug)]
pub struct FetchRequest {
    url: String,
    body: Option<String>,
    content_type: Option<String>,
    bearer_token: Option<String>,
}

impl FetchRequest {
    /// Plain GET
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: None,
            content_type: None,
            bearer_token: None,
        }
    }

    /// POST with a text body
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: Some(body.into()),
            content_type: Some("text/plain".to_string()),
            bearer_token: None,
        }
    }

    /// Override the request content type
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Authenticate with a bearer token
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Body obtained by [`Downloader::fetch`]
#[derive(Debug)]
pub struct FetchOutcome {
    /// Well-formed JSON bytes
    pub payload: Vec<u8>,
    /// True when the payload was repaired from a truncated body
    pub was_recovered: bool,
    /// Transfer attempts made
    pub attempts: u32,
}

/// Streams large JSON payloads with whole-transfer retry
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    config: DownloadConfig,
    event_tx: broadcast::Sender<Event>,
}

impl Downloader {
    /// Create a downloader with its own HTTP client
    pub fn new(config: DownloadConfig, event_tx: broadcast::Sender<Event>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self::with_client(client, config, event_tx))
    }

    /// Create a downloader sharing an existing client
    pub fn with_client(
        client: reqwest::Client,
        config: DownloadConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            config,
            event_tx,
        }
    }

    /// Download `request` into memory and return a well-formed payload
    ///
    /// 4xx responses other than 408/429 abort immediately. Other failures
    /// restart the transfer after `retry_delay`, up to `max_attempts`. Running
    /// out of `total_budget` fails with [`TransportError::BudgetExhausted`] even
    /// when attempts remain.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        let started = Instant::now();
        let budget = self.config.total_budget;
        let max_attempts = self.config.max_attempts.max(1);
        let mut best_partial: Vec<u8> = Vec::new();
        let mut last_error: Option<TransportError> = None;
        let mut attempt: u32 = 0;

        while attempt < max_attempts {
            let remaining = budget.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(budget_exhausted(budget, attempt));
            }
            attempt += 1;

            let limit = remaining.min(self.config.attempt_timeout);
            let mut buf = Vec::new();
            let result =
                tokio::time::timeout(limit, self.stream_attempt(request, attempt, &mut buf)).await;

            let error = match result {
                Ok(Ok(())) => return self.finish(buf, attempt),
                Ok(Err(e)) => e,
                Err(_) if started.elapsed() >= budget => {
                    tracing::error!(
                        url = %request.url,
                        attempt,
                        received = buf.len(),
                        budget_secs = budget.as_secs(),
                        "download budget exhausted mid-transfer"
                    );
                    return Err(budget_exhausted(budget, attempt));
                }
                Err(_) => TransportError::Timeout(format!(
                    "attempt {attempt} exceeded {limit:?} after {} bytes",
                    buf.len()
                )),
            };

            if buf.len() > best_partial.len() {
                best_partial = buf;
            }

            if !error.is_retryable() {
                tracing::error!(url = %request.url, error = %error, "download failed permanently");
                return Err(error.into());
            }

            if attempt < max_attempts {
                let remaining = budget.saturating_sub(started.elapsed());
                if remaining <= self.config.retry_delay {
                    tracing::error!(
                        url = %request.url,
                        attempt,
                        error = %error,
                        "no budget left for another download attempt"
                    );
                    return Err(budget_exhausted(budget, attempt));
                }

                tracing::warn!(
                    url = %request.url,
                    error = %error,
                    attempt,
                    max_attempts,
                    delay_secs = self.config.retry_delay.as_secs(),
                    partial_bytes = best_partial.len(),
                    "download attempt failed, retrying"
                );
                self.event_tx
                    .send(Event::DownloadRetry {
                        attempt,
                        max_attempts,
                        error: error.to_string(),
                        delay_secs: self.config.retry_delay.as_secs(),
                    })
                    .ok();
                tokio::time::sleep(self.config.retry_delay).await;
            }
            last_error = Some(error);
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());

        if best_partial.is_empty() {
            return Err(TransportError::AttemptsExhausted {
                attempts: attempt,
                last_error,
            }
            .into());
        }

        tracing::warn!(
            attempts = attempt,
            partial_bytes = best_partial.len(),
            last_error = %last_error,
            "all download attempts failed, attempting recovery from partial body"
        );
        self.recover(best_partial, attempt)
    }

    async fn stream_attempt(
        &self,
        request: &FetchRequest,
        attempt: u32,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<(), TransportError> {
        let response = self
            .build_request(request)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, 0))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        tracing::debug!(
            url = %request.url,
            attempt,
            content_length = ?response.content_length(),
            "streaming response body"
        );

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let mut reader = std::pin::pin!(StreamReader::new(stream));
        let mut chunk = vec![0u8; self.config.chunk_size.max(1)];
        let interval = self.config.progress_interval_bytes.max(1);
        let mut next_progress = interval;

        loop {
            let n = reader
                .read(&mut chunk)
                .await
                .map_err(|e| TransportError::Interrupted {
                    received: buf.len() as u64,
                    reason: e.to_string(),
                })?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let received = buf.len() as u64;
            if received >= next_progress {
                tracing::info!(
                    attempt,
                    received_mb = received / (1024 * 1024),
                    "download progress"
                );
                self.event_tx
                    .send(Event::DownloadProgress {
                        attempt,
                        bytes_received: received,
                    })
                    .ok();
                while next_progress <= received {
                    next_progress += interval;
                }
            }
        }

        Ok(())
    }

    fn build_request(&self, request: &FetchRequest) -> reqwest::RequestBuilder {
        let mut builder = match &request.body {
            Some(body) => self.client.post(&request.url).body(body.clone()),
            None => self.client.get(&request.url),
        };
        builder = builder.header(reqwest::header::ACCEPT, "application/json");
        if let Some(content_type) = &request.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    fn finish(&self, buf: Vec<u8>, attempts: u32) -> Result<FetchOutcome> {
        if is_well_formed(&buf) {
            tracing::info!(bytes = buf.len(), attempts, "download complete");
            return Ok(FetchOutcome {
                payload: buf,
                was_recovered: false,
                attempts,
            });
        }
        tracing::warn!(
            bytes = buf.len(),
            "response body is not well-formed JSON, attempting recovery"
        );
        self.recover(buf, attempts)
    }

    fn recover(&self, buf: Vec<u8>, attempts: u32) -> Result<FetchOutcome> {
        let repaired = recover_truncated(&buf)?;
        tracing::warn!(
            original_bytes = buf.len(),
            recovered_bytes = repaired.len(),
            "snapshot recovered from truncated body"
        );
        self.event_tx
            .send(Event::SnapshotRecovered {
                original_bytes: buf.len() as u64,
                recovered_bytes: repaired.len() as u64,
            })
            .ok();
        Ok(FetchOutcome {
            payload: repaired,
            was_recovered: true,
            attempts,
        })
    }
}

fn budget_exhausted(budget: Duration, attempts: u32) -> Error {
    Error::Transport(TransportError::BudgetExhausted { budget, attempts })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> DownloadConfig {
        DownloadConfig {
            chunk_size: 16,
            progress_interval_bytes: 32,
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
            connect_timeout: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(10),
            total_budget: Duration::from_secs(30),
        }
    }

    fn downloader(config: DownloadConfig) -> (Downloader, broadcast::Receiver<Event>) {
        let (tx, rx) = broadcast::channel(1000);
        (Downloader::new(config, tx).unwrap(), rx)
    }

    const BODY: &str = r#"{"cis":[{"ucmdbId":"a","type":"t"}],"relations":[{"ucmdbId":"r1","type":"usage","end1Id":"a","end2Id":"a"}]}"#;

    #[tokio::test]
    async fn posts_report_name_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest-api/topology"))
            .and(header("authorization", "Bearer tok-1"))
            .and(header("content-type", "text/plain"))
            .and(body_string("Reporte_Clientes_Onyx-uCMDB"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let (dl, mut rx) = downloader(fast_config());
        let request = FetchRequest::post(
            format!("{}/rest-api/topology", server.uri()),
            "Reporte_Clientes_Onyx-uCMDB",
        )
        .bearer("tok-1");

        let outcome = dl.fetch(&request).await.unwrap();
        assert_eq!(outcome.payload, BODY.as_bytes());
        assert!(!outcome.was_recovered);
        assert_eq!(outcome.attempts, 1);

        let mut progress = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::DownloadProgress { .. }) {
                progress += 1;
            }
        }
        assert_eq!(progress, BODY.len() / 32, "one event per interval crossed");
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let (dl, mut rx) = downloader(fast_config());
        let outcome = dl.fetch(&FetchRequest::get(server.uri())).await.unwrap();

        assert_eq!(outcome.attempts, 3);
        assert!(!outcome.was_recovered);

        let retries = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, Event::DownloadRetry { .. }))
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn client_error_aborts_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let (dl, _rx) = downloader(fast_config());
        let err = dl.fetch(&FetchRequest::get(server.uri())).await.unwrap_err();

        match err {
            Error::Transport(TransportError::Status { status, .. }) => assert_eq!(status, 403),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn persistent_server_errors_exhaust_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let (dl, _rx) = downloader(fast_config());
        let err = dl.fetch(&FetchRequest::get(server.uri())).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Transport(TransportError::AttemptsExhausted { attempts: 3, .. })
        ));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn truncated_body_is_recovered() {
        let server = MockServer::start().await;
        let truncated = &BODY[..BODY.len() - 20];
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(truncated))
            .mount(&server)
            .await;

        let (dl, mut rx) = downloader(fast_config());
        let outcome = dl.fetch(&FetchRequest::get(server.uri())).await.unwrap();

        assert!(outcome.was_recovered);
        assert!(outcome.payload.len() < truncated.len());
        assert!(is_well_formed(&outcome.payload));

        let recovered = std::iter::from_fn(|| rx.try_recv().ok())
            .any(|e| matches!(e, Event::SnapshotRecovered { .. }));
        assert!(recovered);
    }

    #[tokio::test]
    async fn unrecoverable_body_is_malformed_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"cis":[{"ucm"#))
            .mount(&server)
            .await;

        let (dl, _rx) = downloader(fast_config());
        let err = dl.fetch(&FetchRequest::get(server.uri())).await.unwrap_err();
        assert!(matches!(err, Error::MalformedData(_)));
    }

    #[tokio::test]
    async fn total_budget_is_enforced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(BODY)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let config = DownloadConfig {
            max_attempts: 5,
            total_budget: Duration::from_millis(300),
            ..fast_config()
        };
        let (dl, _rx) = downloader(config);

        let started = Instant::now();
        let err = dl.fetch(&FetchRequest::get(server.uri())).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Transport(TransportError::BudgetExhausted { attempts: 1, .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn attempt_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(BODY)
                    .set_delay(Duration::from_secs(5)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let config = DownloadConfig {
            attempt_timeout: Duration::from_millis(200),
            ..fast_config()
        };
        let (dl, _rx) = downloader(config);
        let outcome = dl.fetch(&FetchRequest::get(server.uri())).await.unwrap();
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let config = DownloadConfig {
            max_attempts: 2,
            ..fast_config()
        };
        let (dl, _rx) = downloader(config);
        let err = dl
            .fetch(&FetchRequest::get("http://127.0.0.1:9/topology"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    /// Serves `body` under a Content-Length 500 bytes larger, then hangs up
    async fn short_body_server(body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }

                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
                    body.len() + 500
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(body.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{addr}/topology"), hits)
    }

    #[tokio::test]
    async fn body_cut_mid_transfer_is_retried_then_recovered() {
        let (url, hits) = short_body_server(r#"{"cis":[{"ucmdbId":"a"},{"ucmdbId":"b"},{"ucm"#).await;

        let (dl, mut rx) = downloader(fast_config());
        let outcome = dl.fetch(&FetchRequest::get(url)).await.unwrap();

        assert_eq!(outcome.attempts, 3);
        assert!(outcome.was_recovered);
        assert_eq!(
            outcome.payload,
            br#"{"cis":[{"ucmdbId":"a"},{"ucmdbId":"b"}]}"#
        );
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        let mut retries = 0;
        let mut recovered = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::DownloadRetry { .. } => retries += 1,
                Event::SnapshotRecovered { .. } => recovered = true,
                _ => {}
            }
        }
        assert_eq!(retries, 2);
        assert!(recovered);
    }
}
