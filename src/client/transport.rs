//! HTTP transport used by the client.
//!
//! [`HttpTransport`] is the seam between [`GreyNoiseClient`](super::GreyNoiseClient)
//! and the network. The default implementation, [`RetryingTransport`], wraps a
//! `reqwest` client and owns the retry policy: the client itself never loops.
//! Tests inject their own transport to record requests or fake responses.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Per-request deadline applied by [`RetryingTransport`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: usize = 3;

const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(500);

/// A fully-built outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Serialized JSON body, if any.
    pub body: Option<Vec<u8>>,
}

/// A buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status.
    pub status: StatusCode,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Build a response from a status and body.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failure to obtain any response from the remote side.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Error reported by `reqwest` (connect, timeout, TLS, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error reported by a custom transport.
    #[error("{0}")]
    Other(String),
}

/// Sends requests on behalf of the client.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and buffer its response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport with bounded retries and exponential backoff.
///
/// Connection errors, timeouts, `429 Too Many Requests` and 5xx responses
/// (other than `501 Not Implemented`) are retried up to `max_retries` times.
/// The last response or error is returned once retries are exhausted.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    client: reqwest::Client,
    max_retries: usize,
    base_backoff: Duration,
}

impl RetryingTransport {
    /// Start building a transport.
    pub fn builder() -> RetryingTransportBuilder {
        RetryingTransportBuilder::default()
    }

    /// Transport with the default timeout and retry policy.
    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    fn backoff_delay(&self, retry_number: usize) -> Duration {
        let shift = retry_number.saturating_sub(1).min(8) as u32;
        self.base_backoff.saturating_mul(1u32 << shift)
    }

    async fn sleep_with_backoff(&self, retry_number: usize) {
        let delay = self.backoff_delay(retry_number);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

#[async_trait::async_trait]
impl HttpTransport for RetryingTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let attempts = self.max_retries + 1;
        let method = &request.method;
        let url = &request.url;

        for attempt in 1..=attempts {
            debug!(attempt, %method, %url, "sending HTTP request");
            let last = attempt == attempts;

            match self.send_once(&request).await {
                Ok(response) => {
                    debug!(
                        attempt,
                        %method,
                        %url,
                        status = %response.status,
                        "received HTTP response"
                    );
                    if !last && should_retry_status(response.status) {
                        self.sleep_with_backoff(attempt).await;
                        continue;
                    }
                    return Ok(response);
                },
                Err(err) => {
                    debug!(attempt, %method, %url, error = %err, "HTTP request failed");
                    if !last && should_retry_error(&err) {
                        self.sleep_with_backoff(attempt).await;
                        continue;
                    }
                    return Err(err.into());
                },
            }
        }

        Err(TransportError::Other(
            "transport exhausted retries without producing a result".into(),
        ))
    }
}

/// Builder for [`RetryingTransport`].
#[derive(Debug)]
pub struct RetryingTransportBuilder {
    timeout: Duration,
    max_retries: usize,
    base_backoff: Duration,
    user_agent: Option<String>,
}

impl Default for RetryingTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: DEFAULT_BASE_BACKOFF,
            user_agent: None,
        }
    }
}

impl RetryingTransportBuilder {
    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of retries after the initial attempt.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Delay before the first retry; doubled for each further retry.
    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Value of the `User-Agent` header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<RetryingTransport, TransportError> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        Ok(RetryingTransport {
            client: builder.build()?,
            max_retries: self.max_retries,
            base_backoff: self.base_backoff,
        })
    }
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn fast_transport(max_retries: usize) -> RetryingTransport {
        RetryingTransport::builder()
            .base_backoff(Duration::from_millis(5))
            .max_retries(max_retries)
            .build()
            .expect("transport")
    }

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: Method::GET,
            url: Url::parse(url).expect("url"),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[test]
    fn test_retry_status_policy() {
        assert!(should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(!should_retry_status(StatusCode::NOT_IMPLEMENTED));
        assert!(!should_retry_status(StatusCode::NOT_FOUND));
        assert!(!should_retry_status(StatusCode::OK));
    }

    #[test]
    fn test_backoff_doubles() {
        let transport = RetryingTransport::builder()
            .base_backoff(Duration::from_millis(100))
            .build()
            .expect("transport");
        assert_eq!(transport.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(transport.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(transport.backoff_delay(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_no_retry_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let response = fast_transport(3).send(get(&server.uri())).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, b"ok");
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_success() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        Mock::given(method("GET"))
            .respond_with(move |_: &wiremock::Request| -> ResponseTemplate {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200)
                }
            })
            .mount(&server)
            .await;

        let response = fast_transport(3).send(get(&server.uri())).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_response_when_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let response = fast_transport(3).send(get(&server.uri())).await.unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let response = fast_transport(3).send(get(&server.uri())).await.unwrap();
        assert_eq!(response.status, StatusCode::FORBIDDEN);
    }
}
