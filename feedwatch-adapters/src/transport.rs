//! HTTP transport with bounded, jittered exponential backoff.
//!
//! Both feed kinds go through the same [`RetryPolicy`]; they only differ in
//! the parameters. A single [`HttpFetcher`] (one `reqwest::Client`, one
//! connection pool) is shared by every source in a run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use feedwatch_adapters::transport::{HttpFetcher, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = HttpFetcher::builder().build()?;
//!     let text = fetcher
//!         .fetch_text("https://example.com/feed.csv", &RetryPolicy::forecast_feed())
//!         .await?;
//!     println!("{} bytes", text.len());
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use tracing::{debug, warn};

use crate::AdapterError;

/// Which HTTP statuses are worth another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStatuses {
    /// 429 and every 5xx.
    TooManyRequestsOrServerError,
    /// Exactly the listed statuses.
    Only(Vec<u16>),
}

impl RetryStatuses {
    pub fn contains(&self, status: u16) -> bool {
        match self {
            RetryStatuses::TooManyRequestsOrServerError => {
                status == 429 || (500..600).contains(&status)
            }
            RetryStatuses::Only(list) => list.contains(&status),
        }
    }
}

/// Parameters of the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further one.
    pub base_delay: Duration,
    /// Upper bound of the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to every delay.
    pub jitter: Duration,
    pub retry_statuses: RetryStatuses,
}

impl RetryPolicy {
    /// Policy for the forecast feed: 10 attempts, 2s base, 60s cap.
    pub fn forecast_feed() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(500),
            retry_statuses: RetryStatuses::TooManyRequestsOrServerError,
        }
    }

    /// Policy for version manifests: 3 attempts, 0.5s base.
    pub fn manifest_feed() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(500),
            retry_statuses: RetryStatuses::Only(vec![429, 500, 502, 503, 504]),
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            retry_statuses: RetryStatuses::Only(Vec::new()),
        }
    }

    /// Exponential part of the delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1));
        factor
            .and_then(|f| self.base_delay.checked_mul(f))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Full delay after failed attempt `attempt`: backoff plus jitter.
    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(rng.gen_range(0.0..=self.jitter.as_secs_f64()))
        };
        self.backoff(attempt) + jitter
    }

    /// Whether an error should be retried under this policy.
    pub fn is_retryable(&self, err: &AdapterError) -> bool {
        match err {
            AdapterError::Connection(_) | AdapterError::Timeout => true,
            AdapterError::Status { status, .. } => self.retry_statuses.contains(*status),
            _ => false,
        }
    }

    /// Drive `op` through the policy.
    ///
    /// `op` receives the 1-based attempt number. Non-retryable errors are
    /// returned as-is; running out of attempts wraps the last error in
    /// [`AdapterError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, AdapterError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !self.is_retryable(&err) => return Err(err),
                Err(err) if attempt >= attempts => {
                    return Err(AdapterError::RetriesExhausted {
                        attempts,
                        last: Box::new(err),
                    })
                }
                Err(err) => {
                    let delay = self.delay(attempt, &mut rand::thread_rng());
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::manifest_feed()
    }
}

/// Anything that can produce the decoded text behind a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_text(&self, url: &str, policy: &RetryPolicy) -> Result<String, AdapterError>;
}

/// Shared HTTP session used for every feed in a run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new builder for configuring the fetcher.
    pub fn builder() -> HttpFetcherBuilder {
        HttpFetcherBuilder::default()
    }

    /// The underlying client, for other adapters that share the session.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET `url` under `policy` and decode the body.
    pub async fn fetch_text(&self, url: &str, policy: &RetryPolicy) -> Result<String, AdapterError> {
        let bytes = policy.run(|attempt| self.get_once(url, attempt)).await?;
        Ok(decode_payload(&bytes))
    }

    async fn get_once(&self, url: &str, attempt: u32) -> Result<Vec<u8>, AdapterError> {
        debug!(url, attempt, "GET");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch_text(&self, url: &str, policy: &RetryPolicy) -> Result<String, AdapterError> {
        HttpFetcher::fetch_text(self, url, policy).await
    }
}

/// Builder for HttpFetcher.
#[derive(Debug, Default)]
pub struct HttpFetcherBuilder {
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl HttpFetcherBuilder {
    /// Set the per-attempt request timeout (default: 20 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the User-Agent header (default: `feedwatch/<version>`).
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the fetcher.
    pub fn build(self) -> Result<HttpFetcher, AdapterError> {
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .user_agent(self.user_agent.unwrap_or_else(default_user_agent))
            .build()
            .map_err(|e| AdapterError::Http(e.to_string()))?;

        Ok(HttpFetcher { client })
    }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Characters that show up when UTF-8 was decoded as Latin-1 somewhere
/// upstream, plus the replacement character.
const MOJIBAKE_MARKERS: [char; 3] = ['Ã', 'Â', '\u{FFFD}'];

/// `feedwatch/<crate version>`.
pub fn default_user_agent() -> String {
    format!("feedwatch/{}", env!("CARGO_PKG_VERSION"))
}

/// Decode a response body. Never fails.
///
/// UTF-8 is tried first. Invalid UTF-8, or valid UTF-8 that carries mojibake
/// markers, is decoded as ISO-8859-1 instead.
pub fn decode_payload(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) if !text.contains(&MOJIBAKE_MARKERS[..]) => text.to_string(),
        _ => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_server::{response, truncated, MockServer};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn status(code: u16) -> AdapterError {
        AdapterError::Status {
            status: code,
            url: "https://feed.example/data".to_string(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::forecast_feed();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(5), Duration::from_secs(32));
        assert_eq!(policy.backoff(6), Duration::from_secs(60));
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_within_jitter_bounds() {
        let policy = RetryPolicy::forecast_feed();
        let mut rng = rand::thread_rng();
        for attempt in 1..=10 {
            let delay = policy.delay(attempt, &mut rng);
            assert!(delay >= policy.backoff(attempt));
            assert!(delay <= policy.backoff(attempt) + policy.jitter);
        }
    }

    #[test]
    fn test_retryable_classification() {
        let forecast = RetryPolicy::forecast_feed();
        assert!(forecast.is_retryable(&status(429)));
        assert!(forecast.is_retryable(&status(500)));
        assert!(forecast.is_retryable(&status(599)));
        assert!(!forecast.is_retryable(&status(404)));
        assert!(!forecast.is_retryable(&status(401)));
        assert!(forecast.is_retryable(&AdapterError::Timeout));
        assert!(forecast.is_retryable(&AdapterError::Connection("reset".into())));
        assert!(!forecast.is_retryable(&AdapterError::Http("bad body".into())));
        assert!(!forecast.is_retryable(&AdapterError::Format("x".into())));

        let manifest = RetryPolicy::manifest_feed();
        assert!(manifest.is_retryable(&status(502)));
        assert!(!manifest.is_retryable(&status(501)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_until_success() {
        let policy = RetryPolicy::forecast_feed();
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .run(|attempt| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(status(503))
                    } else {
                        Ok("payload")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "payload");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exhausts_attempts() {
        let policy = RetryPolicy::manifest_feed();
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = policy
            .run(|_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AdapterError::Timeout)
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= policy.backoff(1) + policy.backoff(2));
        match result {
            Err(AdapterError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, AdapterError::Timeout));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_fast_on_client_error() {
        let policy = RetryPolicy::forecast_feed();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .run(|_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(status(404))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(AdapterError::Status { status: 404, .. })));
    }

    #[test]
    fn test_decode_utf8() {
        assert_eq!(decode_payload("Datum;Mittel\n".as_bytes()), "Datum;Mittel\n");
        assert_eq!(decode_payload("Straße".as_bytes()), "Straße");
        assert_eq!(decode_payload(b"\xEF\xBB\xBFDatum"), "Datum");
    }

    #[test]
    fn test_decode_latin1_fallback() {
        // "Straße" in ISO-8859-1 is not valid UTF-8
        assert_eq!(decode_payload(b"Stra\xDFe"), "Straße");
    }

    #[test]
    fn test_decode_mojibake_falls_back() {
        let doubled = "BrÃ¼cke".as_bytes();
        let decoded = decode_payload(doubled);
        assert_eq!(decoded.chars().count(), doubled.len());
        assert!(decoded.starts_with("Br"));
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: Duration::ZERO,
            retry_statuses: RetryStatuses::TooManyRequestsOrServerError,
        }
    }

    #[tokio::test]
    async fn test_fetch_retries_server_error() {
        let server = MockServer::start(vec![
            response(503, "busy"),
            response(200, "Datum;Mittel\n"),
        ])
        .await;
        let fetcher = HttpFetcher::builder().build().unwrap();
        let url = format!("{}/forecast.csv", server.base_url);

        let text = fetcher.fetch_text(&url, &quick_retry()).await.unwrap();

        assert_eq!(text, "Datum;Mittel\n");
        assert_eq!(server.requests().len(), 2);
        assert!(server.requests()[0].starts_with("GET /forecast.csv "));
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_not_retried() {
        let server = MockServer::start(vec![response(404, "gone")]).await;
        let fetcher = HttpFetcher::builder().build().unwrap();
        let url = format!("{}/version.json", server.base_url);

        let err = fetcher.fetch_text(&url, &quick_retry()).await.unwrap_err();

        match err {
            AdapterError::Status { status, url: failed } => {
                assert_eq!(status, 404);
                assert_eq!(failed, url);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_retries_truncated_body() {
        let server = MockServer::start(vec![
            truncated("Datum;Mit"),
            response(200, "Datum;Mittel\n2024-09-15 00:00:00;12,5\n"),
        ])
        .await;
        let fetcher = HttpFetcher::builder().build().unwrap();
        let url = format!("{}/forecast.csv", server.base_url);

        let text = fetcher.fetch_text(&url, &quick_retry()).await.unwrap();

        assert!(text.ends_with("12,5\n"));
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_server_errors() {
        let server = MockServer::start(vec![]).await;
        let fetcher = HttpFetcher::builder().build().unwrap();
        let url = format!("{}/forecast.csv", server.base_url);

        let err = fetcher.fetch_text(&url, &quick_retry()).await.unwrap_err();

        assert!(matches!(err, AdapterError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(server.requests().len(), 3);
    }

    #[test]
    fn test_builder_defaults() {
        assert!(HttpFetcher::builder().build().is_ok());
        assert!(default_user_agent().starts_with("feedwatch/"));
    }
}
