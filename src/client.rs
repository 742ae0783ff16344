//! Client configuration and the service-wide endpoints.

use crate::error::StreamError;
use crate::retry::RetryConfig;
use crate::stream::StreamHandle;
use crate::transport::{BodyStream, HttpTransport, Transport, TransportRequest};
use crate::types::SUCCESS_FIELD;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Service endpoint paths
pub(crate) const INDEX_PATH: &str = "/1.0/index";
pub(crate) const EVENTS_PUT_PATH: &str = "/1.0/events/put";
pub(crate) const EVENTS_GET_PATH: &str = "/1.0/events/get";
pub(crate) const EVENTS_DELETE_PATH: &str = "/1.0/events/delete";
pub(crate) const STREAMS_PATH: &str = "/1.0/streams";
pub(crate) const INFER_SCHEMA_PATH: &str = "/1.0/streams/infer_schema";

/// An event log client.
///
/// The client is cheap to clone and can be shared across threads and
/// concurrent reads; its configuration never changes after construction.
#[derive(Clone, Debug)]
pub struct Client {
    pub(crate) base_url: String,
    pub(crate) namespace: Option<String>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) retry: RetryConfig,
    pub(crate) read_timeout: Duration,
}

impl Client {
    /// Create a client for the service at `base_url` with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self, StreamError> {
        ClientBuilder::new(base_url).build()
    }

    /// Create a client builder for customization.
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// Create a handle for the named stream.
    ///
    /// No network request is made until an operation is called.
    pub fn stream(&self, name: impl Into<String>) -> StreamHandle {
        StreamHandle {
            name: name.into(),
            namespace: None,
            client: self.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Namespace used when a call does not name one.
    pub fn default_namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Fetch the service index.
    pub async fn index(&self) -> Result<ServiceResponse, StreamError> {
        let request = TransportRequest::get(self.url(INDEX_PATH));
        self.call(request).await
    }

    /// List the streams in the client's default namespace.
    pub async fn streams(&self) -> Result<Vec<String>, StreamError> {
        self.streams_in(self.namespace.as_deref()).await
    }

    /// List the streams in `namespace` (or the service default if `None`).
    pub async fn streams_in(&self, namespace: Option<&str>) -> Result<Vec<String>, StreamError> {
        #[derive(Serialize)]
        struct WireStreamsRequest<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            namespace: Option<&'a str>,
        }

        let request =
            TransportRequest::post_json(self.url(STREAMS_PATH), &WireStreamsRequest { namespace })?;
        let body = self.transport.execute(request).await?;
        let body = read_body(body).await?;

        Ok(String::from_utf8_lossy(&body)
            .split("\r\n")
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Absolute URL for a service path.
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue a non-streaming request and check its success envelope.
    ///
    /// Never retried.
    pub(crate) async fn call(&self, request: TransportRequest) -> Result<ServiceResponse, StreamError> {
        debug!(method = %request.method, url = %request.url, "service call");
        let body = self.transport.execute(request).await?;
        let body = read_body(body).await?;
        ServiceResponse::parse(&body)
    }
}

/// Read a whole (small) response body.
async fn read_body(mut body: BodyStream) -> Result<Bytes, StreamError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Response of a non-streaming endpoint.
///
/// Only constructed for responses whose success flag is set.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceResponse {
    body: Map<String, Value>,
}

impl ServiceResponse {
    pub(crate) fn parse(body: &[u8]) -> Result<Self, StreamError> {
        let body: Map<String, Value> = serde_json::from_slice(body)?;

        match body.get(SUCCESS_FIELD) {
            Some(Value::Bool(true)) => Ok(ServiceResponse { body }),
            _ => {
                let message = body
                    .get("@errors")
                    .map(Value::to_string)
                    .unwrap_or_else(|| Value::Object(body.clone()).to_string());
                Err(StreamError::Service { message })
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// The full response object.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_body(self) -> Map<String, Value> {
        self.body
    }
}

/// Builder for configuring a Client.
#[must_use = "builders do nothing unless you call .build()"]
pub struct ClientBuilder {
    base_url: String,
    namespace: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    retry: RetryConfig,
    read_timeout: Duration,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            namespace: None,
            transport: None,
            retry: RetryConfig::default(),
            read_timeout: Duration::from_secs(30),
        }
    }

    /// Set the namespace used when a call does not name one.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Use a custom transport instead of the default [`HttpTransport`].
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Set the default retry policy for range reads.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the default per-attempt read timeout for range reads.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Build the client.
    ///
    /// Returns an error if the base URL is not an http(s) URL, or if the
    /// default HTTP transport fails to build.
    pub fn build(self) -> Result<Client, StreamError> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(StreamError::InvalidUrl(self.base_url));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };

        Ok(Client {
            base_url,
            namespace: self.namespace,
            transport,
            retry: self.retry,
            read_timeout: self.read_timeout,
        })
    }
}
