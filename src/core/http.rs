/*!
Outbound HTTP through the VPN egress.

All network I/O in the relay goes through [`HttpClientTrait`], so playlist
fetches, probes, relays and geolocation lookups can be exercised against mocks.
The production implementation wraps an `isahc` client that is either pinned to
the VPN's HTTP proxy or explicitly configured for a direct connection.
*/

use futures::io::AsyncRead;
use std::sync::Arc;
use std::time::{Duration, Instant};

use isahc::config::{Configurable, RedirectPolicy};
use isahc::http::header::{CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use isahc::http::Uri;
use isahc::{AsyncReadResponseExt, HttpClient, Request};

/// Transport-level failure; the origin never produced a status line
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Failed(String),
}

impl From<isahc::Error> for TransportError {
    fn from(error: isahc::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Failed(error.to_string())
        }
    }
}

/// Fully buffered response (playlist text, geolocation JSON)
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub duration: Duration,
}

/// Streaming response; the body is consumed as it arrives
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// Seconds from a numeric Retry-After header
    pub retry_after_secs: Option<u64>,
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Timeouts for an unbounded live relay
#[derive(Debug, Clone, Copy)]
pub struct StreamTimeouts {
    pub connect: Duration,
    /// Abort when throughput stays below 1 byte/s for this long
    pub low_speed: Duration,
}

/// HTTP client abstraction for dependency injection and testing
#[async_trait::async_trait]
pub trait HttpClientTrait: Send + Sync {
    /// GET and buffer the whole body, bounded by `timeout`
    async fn get(&self, url: &str, timeout: Duration) -> Result<BufferedResponse, TransportError>;

    /// HEAD without following redirects; returns status and latency
    async fn head(&self, url: &str, timeout: Duration) -> Result<(u16, Duration), TransportError>;

    /// GET returning as soon as the response head arrives
    async fn open_stream(
        &self,
        url: &str,
        timeouts: StreamTimeouts,
    ) -> Result<UpstreamResponse, TransportError>;
}

/// Production HTTP client implementation using isahc
pub struct IsahcHttpClient {
    client: HttpClient,
    user_agent: String,
    via_proxy: bool,
}

impl IsahcHttpClient {
    /// Client whose every request leaves through the VPN's HTTP proxy.
    /// HTTPS origins are tunnelled with CONNECT, so one client covers both schemes.
    pub fn via_proxy(proxy_uri: &str, user_agent: &str) -> Result<Self, TransportError> {
        let proxy: Uri = proxy_uri
            .parse()
            .map_err(|e| TransportError::Failed(format!("Invalid proxy URI {}: {}", proxy_uri, e)))?;

        let client = HttpClient::builder()
            .proxy(Some(proxy))
            .build()
            .map_err(|e| TransportError::Failed(format!("Failed to create proxy client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            via_proxy: true,
        })
    }

    /// Client that bypasses any proxy, including ones from the environment
    pub fn direct(user_agent: &str) -> Result<Self, TransportError> {
        let client = HttpClient::builder()
            .proxy(None::<Uri>)
            .build()
            .map_err(|e| TransportError::Failed(format!("Failed to create direct client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            via_proxy: false,
        })
    }

    pub fn is_via_proxy(&self) -> bool {
        self.via_proxy
    }

    fn header_string(
        headers: &isahc::http::HeaderMap,
        name: isahc::http::header::HeaderName,
    ) -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
    }
}

#[async_trait::async_trait]
impl HttpClientTrait for IsahcHttpClient {
    async fn get(&self, url: &str, timeout: Duration) -> Result<BufferedResponse, TransportError> {
        let start = Instant::now();

        let request = Request::get(url)
            .timeout(timeout)
            .redirect_policy(RedirectPolicy::Limit(5))
            .header("User-Agent", self.user_agent.as_str())
            .body(())
            .map_err(|e| TransportError::Failed(format!("Request creation failed: {}", e)))?;

        let mut response = self.client.send_async(request).await?;
        let status = response.status().as_u16();

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Failed(format!("Failed to read response body: {}", e)))?;

        Ok(BufferedResponse {
            status,
            body,
            duration: start.elapsed(),
        })
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<(u16, Duration), TransportError> {
        let start = Instant::now();

        let request = Request::head(url)
            .timeout(timeout)
            .redirect_policy(RedirectPolicy::None)
            .header("User-Agent", self.user_agent.as_str())
            .body(())
            .map_err(|e| TransportError::Failed(format!("Request creation failed: {}", e)))?;

        let response = self.client.send_async(request).await?;
        Ok((response.status().as_u16(), start.elapsed()))
    }

    async fn open_stream(
        &self,
        url: &str,
        timeouts: StreamTimeouts,
    ) -> Result<UpstreamResponse, TransportError> {
        let request = Request::get(url)
            .connect_timeout(timeouts.connect)
            .low_speed_timeout(1, timeouts.low_speed)
            .redirect_policy(RedirectPolicy::Limit(5))
            .header("User-Agent", self.user_agent.as_str())
            .body(())
            .map_err(|e| TransportError::Failed(format!("Request creation failed: {}", e)))?;

        let response = self.client.send_async(request).await?;
        let status = response.status().as_u16();
        let headers = response.headers();

        let content_type = Self::header_string(headers, CONTENT_TYPE);
        let content_length = Self::header_string(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok());
        let retry_after_secs = Self::header_string(headers, RETRY_AFTER).and_then(|v| v.trim().parse().ok());

        Ok(UpstreamResponse {
            status,
            content_type,
            content_length,
            retry_after_secs,
            body: Box::new(response.into_body()),
        })
    }
}

/// The two tiers of egress available to the relay
///
/// `vpn` is always present. `direct` exists only when the configuration
/// explicitly allows leaving through the host's own address.
#[derive(Clone)]
pub struct Egress {
    pub vpn: Arc<dyn HttpClientTrait>,
    pub direct: Option<Arc<dyn HttpClientTrait>>,
}

impl Egress {
    pub fn new(vpn: Arc<dyn HttpClientTrait>, direct: Option<Arc<dyn HttpClientTrait>>) -> Self {
        Self { vpn, direct }
    }

    pub fn vpn_only(vpn: Arc<dyn HttpClientTrait>) -> Self {
        Self { vpn, direct: None }
    }
}
