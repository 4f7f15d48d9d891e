//! HTTP access to the source resource.
//!
//! The probe and the orchestrator only talk to [`Fetcher`], which keeps
//! them testable without a network. [`ReqwestFetcher`] is the production
//! backend and owns the client tag and the optional retry policy.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::{RelayError, RelayResult};

pub const DEFAULT_USER_AGENT: &str = "Telegram-File-Downloader-Bot/1.0";

/// An inclusive byte range, rendered as `bytes=start-end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    /// Parsed `Content-Length` header; `None` when absent or not a number.
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    /// Empty for HEAD requests and for non-success statuses.
    pub body: Bytes,
}

impl FetchResponse {
    fn from_headers(response: &reqwest::Response) -> Self {
        let headers = response.headers();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Self {
            status: response.status(),
            content_length,
            content_type,
            body: Bytes::new(),
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Metadata-only request. Never retried.
    async fn head(&self, url: &Url) -> RelayResult<FetchResponse>;

    /// Body request, optionally bounded to `range`.
    ///
    /// Non-success statuses are returned as `Ok` so callers can map them
    /// to their own error; only transport failures are `Err`.
    async fn get(&self, url: &Url, range: Option<ByteRange>) -> RelayResult<FetchResponse>;
}

/// Bounded retry with exponential backoff for body and range fetches.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Upper bound for a single backoff delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

impl RetryPolicy {
    /// Delay before attempt number `attempt` (1-based retry count), capped at
    /// [`MAX_RETRY_DELAY`].
    pub fn delay_for(&self, attempt: u8) -> Duration {
        2u32.checked_pow(u32::from(attempt.saturating_sub(1)))
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
    }
}

pub struct ReqwestFetcher {
    client: Client,
    user_agent: String,
    retry: RetryPolicy,
}

impl ReqwestFetcher {
    pub fn new(
        user_agent: impl Into<String>,
        retry: RetryPolicy,
        timeout: Option<Duration>,
    ) -> RelayResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            user_agent: user_agent.into(),
            retry,
        })
    }

    fn request(&self, method: reqwest::Method, url: &Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url.clone())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
    }

    async fn get_once(&self, url: &Url, range: Option<ByteRange>) -> RelayResult<FetchResponse> {
        let mut request = self.request(reqwest::Method::GET, url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = request.send().await?;
        let mut fetched = FetchResponse::from_headers(&response);
        if fetched.status.is_success() {
            fetched.body = response.bytes().await?;
        }
        Ok(fetched)
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn head(&self, url: &Url) -> RelayResult<FetchResponse> {
        let response = self.request(reqwest::Method::HEAD, url).send().await?;
        Ok(FetchResponse::from_headers(&response))
    }

    async fn get(&self, url: &Url, range: Option<ByteRange>) -> RelayResult<FetchResponse> {
        let mut attempt = 0u8;
        loop {
            let result = self.get_once(url, range).await;
            let retryable = match &result {
                Ok(response) => response.status.is_server_error(),
                Err(RelayError::Http(_)) => true,
                Err(_) => false,
            };

            if !retryable || attempt >= self.retry.max_retries {
                return result;
            }

            attempt += 1;
            let delay = self.retry.delay_for(attempt);
            tracing::warn!(
                url = %url,
                range = ?range,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying fetch"
            );
            tokio::time::sleep(delay).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::any;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_range_header_is_inclusive() {
        let range = ByteRange {
            start: 47185920,
            end: 94371839,
        };
        assert_eq!(range.header_value(), "bytes=47185920-94371839");
    }

    #[test]
    fn test_retry_delay_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_default_policy_does_not_retry() {
        assert_eq!(RetryPolicy::default().max_retries, 0);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: u8::MAX,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(8), Duration::from_millis(60000));
        assert_eq!(policy.delay_for(40), MAX_RETRY_DELAY);
        assert_eq!(policy.delay_for(u8::MAX), MAX_RETRY_DELAY);
    }

    /// Serve `statuses` in order on `/file`, then `200`. Returns the URL and
    /// the hit counter.
    async fn scripted_source(statuses: Vec<StatusCode>) -> (Url, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let script = Arc::new(statuses);
        let counter = hits.clone();
        let app = Router::new().route(
            "/file",
            any(move || {
                let counter = counter.clone();
                let script = script.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let status = script.get(n).copied().unwrap_or(StatusCode::OK);
                    (status, "payload")
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (Url::parse(&format!("http://{addr}/file")).unwrap(), hits)
    }

    fn fetcher(max_retries: u8) -> ReqwestFetcher {
        let retry = RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        };
        ReqwestFetcher::new(DEFAULT_USER_AGENT, retry, Some(Duration::from_secs(10))).unwrap()
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let (url, hits) = scripted_source(vec![
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::BAD_GATEWAY,
        ])
        .await;

        let response = fetcher(3).get(&url, None).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"payload");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_stop_at_limit() {
        let (url, hits) = scripted_source(vec![StatusCode::INTERNAL_SERVER_ERROR; 5]).await;

        let response = fetcher(1).get(&url, None).await.unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (url, hits) = scripted_source(vec![StatusCode::NOT_FOUND]).await;

        let response = fetcher(3).get(&url, None).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_head_is_not_retried() {
        let (url, hits) = scripted_source(vec![StatusCode::SERVICE_UNAVAILABLE]).await;

        let response = fetcher(3).head(&url).await.unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_range_and_user_agent_are_sent() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let recorder = seen.clone();
        let app = Router::new().route(
            "/file",
            any(move |headers: axum::http::HeaderMap| {
                let recorder = recorder.clone();
                async move {
                    let header = |name: &str| {
                        headers
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string)
                    };
                    *recorder.lock().unwrap() = Some((header("range"), header("user-agent")));
                    (StatusCode::PARTIAL_CONTENT, "part")
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let url = Url::parse(&format!("http://{addr}/file")).unwrap();

        let response = fetcher(0)
            .get(&url, Some(ByteRange { start: 10, end: 19 }))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some((
                Some("bytes=10-19".to_string()),
                Some(DEFAULT_USER_AGENT.to_string())
            ))
        );
    }
}
