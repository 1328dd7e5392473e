//! Rate-limited HTTP fetching with retry and bounded streaming reads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub backoff: BackoffPolicy,
    pub token_bucket: Option<TokenBucketConfig>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: None,
            global_concurrency: 8,
            per_source_concurrency: 1,
            backoff: BackoffPolicy::default(),
            token_bucket: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBucketConfig {
    pub capacity: u32,
    pub refill_every: Duration,
}

impl TokenBucketConfig {
    /// Bucket allowing roughly `per_second` requests each second.
    pub fn per_second(per_second: u32) -> Self {
        let per_second = per_second.max(1);
        Self {
            capacity: per_second,
            refill_every: Duration::from_millis((1000 / u64::from(per_second)).max(1)),
        }
    }
}

#[derive(Debug)]
pub struct SimpleTokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug, Clone, Copy)]
struct TokenBucketState {
    tokens: u32,
    last_refill: Instant,
}

impl SimpleTokenBucket {
    pub fn new(config: TokenBucketConfig) -> Self {
        Self {
            capacity: config.capacity,
            refill_every: config.refill_every,
            state: Mutex::new(TokenBucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Wait until a token is available and consume it.
    pub async fn take(&self) {
        loop {
            let mut state = self.state.lock().await;
            let elapsed = state.last_refill.elapsed();
            if self.refill_every.as_millis() > 0 && elapsed >= self.refill_every {
                let refills = (elapsed.as_millis() / self.refill_every.as_millis()) as u32;
                state.tokens = state.tokens.saturating_add(refills).min(self.capacity);
                state.last_refill = Instant::now();
            }

            if state.tokens > 0 {
                state.tokens -= 1;
                return;
            }

            drop(state);
            tokio::time::sleep(self.refill_every).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("empty response body from {url}")]
    EmptyBody { url: String },
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("fetch limiter closed")]
    LimiterClosed,
}

/// Shared HTTP client for every source adapter.
///
/// Concurrency is bounded globally and per source; an optional token bucket
/// spaces out requests (pagination relies on this for rate limiting).
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    token_bucket: Option<Arc<SimpleTokenBucket>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            token_bucket: config.token_bucket.map(|c| Arc::new(SimpleTokenBucket::new(c))),
            backoff: config.backoff,
        })
    }

    async fn per_source_semaphore(&self, source: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    /// Fetch a full response body. Non-success statuses are errors.
    pub async fn fetch_bytes(
        &self,
        run_id: Uuid,
        source: &str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", %run_id, source, url);
        async {
            let _global = self.global_limit.acquire().await.map_err(|_| FetchError::LimiterClosed)?;
            let per_source = self.per_source_semaphore(source).await;
            let _source = per_source.acquire().await.map_err(|_| FetchError::LimiterClosed)?;

            let resp = self.send_with_retry(url).await?;
            let final_url = resp.url().to_string();
            let body = resp.bytes().await?.to_vec();
            debug!(bytes = body.len(), "fetched body");
            Ok::<_, FetchError>(FetchedResponse {
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }

    /// Fetch a body as text; a blank body is an error.
    pub async fn fetch_text(&self, run_id: Uuid, source: &str, url: &str) -> Result<String, FetchError> {
        let resp = self.fetch_bytes(run_id, source, url).await?;
        let text = String::from_utf8_lossy(&resp.body).into_owned();
        if text.trim().is_empty() {
            return Err(FetchError::EmptyBody { url: resp.final_url });
        }
        Ok(text)
    }

    pub async fn fetch_json(&self, run_id: Uuid, source: &str, url: &str) -> Result<JsonValue, FetchError> {
        let resp = self.fetch_bytes(run_id, source, url).await?;
        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Err(FetchError::EmptyBody { url: resp.final_url });
        }
        serde_json::from_slice(&resp.body).map_err(|source| FetchError::Decode {
            url: resp.final_url,
            source,
        })
    }

    /// Stream a delimited body and stop once `max_lines` non-blank lines have
    /// arrived. Memory use is bounded by the line cap, not the body size.
    pub async fn fetch_line_prefix(
        &self,
        run_id: Uuid,
        source: &str,
        url: &str,
        max_lines: usize,
    ) -> Result<String, FetchError> {
        let span = info_span!("http_fetch_prefix", %run_id, source, url, max_lines);
        async {
            let _global = self.global_limit.acquire().await.map_err(|_| FetchError::LimiterClosed)?;
            let per_source = self.per_source_semaphore(source).await;
            let _source = per_source.acquire().await.map_err(|_| FetchError::LimiterClosed)?;

            let mut resp = self.send_with_retry(url).await?;
            let mut buf: Vec<u8> = Vec::new();
            let mut counter = LineCounter::new(max_lines);
            let mut cut_at = None;
            while let Some(chunk) = resp.chunk().await? {
                buf.extend_from_slice(&chunk);
                if let Some(end) = counter.scan(&buf) {
                    cut_at = Some(end);
                    break;
                }
            }
            if let Some(end) = cut_at {
                buf.truncate(end);
                debug!(bytes = buf.len(), "line cap reached; stopped reading body");
            }

            let text = String::from_utf8_lossy(&buf).into_owned();
            if text.trim().is_empty() {
                return Err(FetchError::EmptyBody { url: url.to_string() });
            }
            Ok::<_, FetchError>(text)
        }
        .instrument(span)
        .await
    }

    async fn send_with_retry(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let mut attempt = 0;
        loop {
            if let Some(bucket) = &self.token_bucket {
                bucket.take().await;
            }

            let retry_allowed = attempt < self.backoff.max_retries;
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if classify_status(status) == RetryDisposition::Retryable && retry_allowed {
                        warn!(status = status.as_u16(), attempt, "retryable status; backing off");
                    } else {
                        return Err(FetchError::HttpStatus {
                            status: status.as_u16(),
                            url: resp.url().to_string(),
                        });
                    }
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable && retry_allowed {
                        warn!(error = %err, attempt, "retryable request error; backing off");
                    } else {
                        return Err(FetchError::Request(err));
                    }
                }
            }

            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }
}

/// Incremental counter of complete, non-blank lines in a growing buffer.
#[derive(Debug)]
struct LineCounter {
    max_lines: usize,
    seen: usize,
    line_start: usize,
}

impl LineCounter {
    fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            seen: 0,
            line_start: 0,
        }
    }

    /// Scan newly appended bytes; returns the byte offset just past the line
    /// that reached the cap.
    fn scan(&mut self, buf: &[u8]) -> Option<usize> {
        if self.max_lines == 0 {
            return Some(0);
        }
        while let Some(pos) = buf[self.line_start..].iter().position(|b| *b == b'\n') {
            let end = self.line_start + pos;
            if !buf[self.line_start..end].iter().all(u8::is_ascii_whitespace) {
                self.seen += 1;
            }
            self.line_start = end + 1;
            if self.seen >= self.max_lines {
                return Some(self.line_start);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer a single request on a local port with `status` and `body`.
    async fn serve_once(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            // The prefix reader hangs up early; later writes may fail.
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/feed.csv")
    }

    fn local_fetcher() -> HttpFetcher {
        HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(10),
            backoff: BackoffPolicy {
                max_retries: 0,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(350));
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), RetryDisposition::NonRetryable);
    }

    #[test]
    fn line_counter_stops_after_cap_across_chunks() {
        let mut counter = LineCounter::new(3);
        let mut buf = b"header\n\nrow1".to_vec();
        assert_eq!(counter.scan(&buf), None);
        buf.extend_from_slice(b"\nrow2\nrow3\n");
        let end = counter.scan(&buf).unwrap();
        assert_eq!(&buf[..end], b"header\n\nrow1\nrow2\n");
    }

    #[test]
    fn line_counter_ignores_blank_lines() {
        let mut counter = LineCounter::new(2);
        let buf = b"\n  \r\na\n \nb\nc\n".to_vec();
        let end = counter.scan(&buf).unwrap();
        assert_eq!(&buf[..end], b"\n  \r\na\n \nb\n");
    }

    #[test]
    fn token_bucket_per_second_spreads_refills() {
        let config = TokenBucketConfig::per_second(4);
        assert_eq!(config.capacity, 4);
        assert_eq!(config.refill_every, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn token_bucket_serves_full_capacity_without_waiting() {
        let bucket = SimpleTokenBucket::new(TokenBucketConfig {
            capacity: 3,
            refill_every: Duration::from_secs(60),
        });
        let started = Instant::now();
        for _ in 0..3 {
            bucket.take().await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn not_found_is_an_http_status_error() {
        let url = serve_once("404 Not Found", "missing".to_string()).await;
        let err = local_fetcher()
            .fetch_text(Uuid::new_v4(), "local", &url)
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::HttpStatus { status: 404, .. }),
            "{err}"
        );
    }

    #[tokio::test]
    async fn whitespace_body_is_empty() {
        let url = serve_once("200 OK", " \n\t\n ".to_string()).await;
        let err = local_fetcher()
            .fetch_text(Uuid::new_v4(), "local", &url)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody { .. }), "{err}");

        let url = serve_once("200 OK", "\n\n".to_string()).await;
        let err = local_fetcher()
            .fetch_json(Uuid::new_v4(), "local", &url)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody { .. }), "{err}");
    }

    #[tokio::test]
    async fn json_body_decodes() {
        let url = serve_once("200 OK", r#"[{"id":"a"},{"id":"b"}]"#.to_string()).await;
        let value = local_fetcher()
            .fetch_json(Uuid::new_v4(), "local", &url)
            .await
            .unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn line_prefix_stops_at_the_cap() {
        let mut body = String::from("h\n");
        for i in 0..100_000 {
            body.push_str(&format!("row{i}\n"));
        }
        let url = serve_once("200 OK", body).await;
        let text = local_fetcher()
            .fetch_line_prefix(Uuid::new_v4(), "local", &url, 4)
            .await
            .unwrap();
        assert_eq!(text, "h\nrow0\nrow1\nrow2\n");
    }

    #[tokio::test]
    async fn line_prefix_of_short_body_is_the_whole_body() {
        let url = serve_once("200 OK", "h\nrow0".to_string()).await;
        let text = local_fetcher()
            .fetch_line_prefix(Uuid::new_v4(), "local", &url, 50)
            .await
            .unwrap();
        assert_eq!(text, "h\nrow0");
    }

    #[test]
    fn fetcher_builds_without_network() {
        let fetcher = HttpFetcher::new(HttpClientConfig {
            user_agent: Some("pourbase-test".into()),
            token_bucket: Some(TokenBucketConfig::per_second(2)),
            ..Default::default()
        });
        assert!(fetcher.is_ok());
    }
}
