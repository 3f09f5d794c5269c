//! Error types for adapters.

use thiserror::Error;

/// Coarse classification of an [`AdapterError`].
///
/// The orchestrator decides how far a failure propagates from its kind:
/// transport and format failures only cost the current source, notification
/// failures leave the state untouched so the next run retries, and
/// configuration failures stop the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Format,
    Config,
    Notify,
}

/// Errors that can occur while fetching, parsing or notifying.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Server answered with a non-success status.
    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// HTTP request failed for a reason other than status or connectivity.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// Every attempt allowed by the retry policy failed.
    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<AdapterError>,
    },

    /// Payload could not be parsed.
    #[error("Unexpected payload format: {0}")]
    Format(String),

    /// Required credential or setting is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Notification sink rejected or failed to deliver the message.
    #[error("Notification failed: {0}")]
    Notify(String),
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Status { .. }
            | AdapterError::Http(_)
            | AdapterError::Connection(_)
            | AdapterError::Timeout
            | AdapterError::RetriesExhausted { .. } => ErrorKind::Transport,
            AdapterError::Format(_) => ErrorKind::Format,
            AdapterError::Config(_) => ErrorKind::Config,
            AdapterError::Notify(_) => ErrorKind::Notify,
        }
    }

    pub fn is_config(&self) -> bool {
        self.kind() == ErrorKind::Config
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
            // Broke off mid-exchange.
            AdapterError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            AdapterError::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            AdapterError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Format(err.to_string())
    }
}
