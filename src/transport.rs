//! The request/response primitive the client is built on.

use crate::error::{InvalidHeaderError, StreamError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use http::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// A response body, delivered as it arrives.
pub type BodyStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// Dynamic header provider, called once per request.
pub type HeaderProvider = Arc<dyn Fn() -> HeaderMap + Send + Sync>;

/// One request to the service.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// JSON body, if any.
    pub body: Option<Bytes>,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
        }
    }

    /// A POST carrying `body` serialized as JSON.
    pub fn post_json<T: serde::Serialize>(
        url: impl Into<String>,
        body: &T,
    ) -> Result<Self, StreamError> {
        Ok(Self {
            method: Method::POST,
            url: url.into(),
            body: Some(Bytes::from(serde_json::to_vec(body)?)),
        })
    }
}

/// Sends a request and hands back the raw response body.
///
/// Implementations must report connection failures, timeouts and non-2xx
/// statuses as errors; a returned body is always a success response.
pub trait Transport: fmt::Debug + Send + Sync + 'static {
    fn execute(&self, request: TransportRequest) -> BoxFuture<'_, Result<BodyStream, StreamError>>;
}

/// [`Transport`] over a pooled `reqwest` client.
#[derive(Clone)]
pub struct HttpTransport {
    inner: reqwest::Client,
    default_headers: HeaderMap,
    header_provider: Option<HeaderProvider>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("default_headers", &self.default_headers)
            .field("has_header_provider", &self.header_provider.is_some())
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport with default settings.
    pub fn new() -> Result<Self, StreamError> {
        HttpTransportBuilder::new().build()
    }

    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    /// Get headers for a request, including dynamic headers if configured.
    fn headers(&self) -> HeaderMap {
        let mut headers = self.default_headers.clone();
        if let Some(provider) = &self.header_provider {
            for (key, value) in provider().iter() {
                headers.insert(key.clone(), value.clone());
            }
        }
        headers
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: TransportRequest) -> BoxFuture<'_, Result<BodyStream, StreamError>> {
        Box::pin(async move {
            let mut req = self
                .inner
                .request(request.method, &request.url)
                .headers(self.headers());

            if let Some(body) = request.body {
                req = req
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .body(body);
            }

            let resp = req.send().await?;
            let status = resp.status();
            trace!(url = %request.url, %status, "response opened");
            if !status.is_success() {
                return Err(StreamError::from_status(status.as_u16(), &request.url));
            }

            Ok(resp.bytes_stream().map_err(StreamError::from).boxed())
        })
    }
}

/// Builder for configuring an [`HttpTransport`].
#[must_use = "builders do nothing unless you call .build()"]
pub struct HttpTransportBuilder {
    default_headers: HeaderMap,
    connect_timeout: Duration,
    header_provider: Option<HeaderProvider>,
}

impl HttpTransportBuilder {
    pub fn new() -> Self {
        Self {
            default_headers: HeaderMap::new(),
            connect_timeout: Duration::from_secs(10),
            header_provider: None,
        }
    }

    /// Add a default header for all requests.
    ///
    /// Invalid header names or values are silently ignored. Use
    /// [`try_default_header`](Self::try_default_header) if you need error handling.
    pub fn default_header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.default_headers.insert(name, val);
        }
        self
    }

    /// Add a default header, returning an error if the name or value is invalid.
    pub fn try_default_header(
        mut self,
        key: &str,
        value: &str,
    ) -> std::result::Result<Self, InvalidHeaderError> {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| InvalidHeaderError::InvalidName(key.to_string()))?;
        let val = HeaderValue::from_str(value)
            .map_err(|_| InvalidHeaderError::InvalidValue(value.to_string()))?;
        self.default_headers.insert(name, val);
        Ok(self)
    }

    /// Set the connect timeout for each attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set a dynamic header provider (called per-request).
    pub fn header_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> HeaderMap + Send + Sync + 'static,
    {
        self.header_provider = Some(Arc::new(provider));
        self
    }

    /// Build the transport.
    ///
    /// Fails if the underlying HTTP client fails to build
    /// (e.g., due to TLS configuration issues).
    pub fn build(self) -> Result<HttpTransport, StreamError> {
        let inner = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(HttpTransport {
            inner,
            default_headers: self.default_headers,
            header_provider: self.header_provider,
        })
    }
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
