//! Error types for the event log client.

use thiserror::Error;

/// Error for invalid HTTP header configuration.
#[derive(Debug, Clone, Error)]
pub enum InvalidHeaderError {
    #[error("invalid header name: {0}")]
    InvalidName(String),
    #[error("invalid header value: {0}")]
    InvalidValue(String),
}

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("timeout")]
    Timeout,

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed event in response body: {0}")]
    Decode(String),

    #[error("response body ended inside an event ({pending} bytes pending)")]
    Truncated { pending: usize },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<StreamError>,
    },

    #[error("service reported failure: {message}")]
    Service { message: String },

    #[error("json error: {0}")]
    Json(String),

    #[error("field {0} is reserved")]
    ReservedField(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl StreamError {
    /// Create error from a non-success HTTP status code
    pub fn from_status(status: u16, url: &str) -> Self {
        StreamError::Status {
            status,
            url: url.to_string(),
        }
    }

    /// Whether this error came from moving bytes rather than from the service's verdict.
    ///
    /// Transport failures are the only errors a range read retries.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StreamError::Network(_)
                | StreamError::Timeout
                | StreamError::Status { .. }
                | StreamError::Decode(_)
                | StreamError::Truncated { .. }
        )
    }

    /// HTTP status code if applicable
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StreamError::Status { status, .. } => Some(*status),
            StreamError::Network(err) => err.status().map(|s| s.as_u16()),
            StreamError::RetriesExhausted { last, .. } => last.status_code(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamError::Timeout
        } else {
            StreamError::Network(err)
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Json(err.to_string())
    }
}
