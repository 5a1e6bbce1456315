// error.rs — Error types for the coordination server API client.

use thiserror::Error;

/// Errors that can occur while talking to the coordination server.
#[derive(Debug, Error)]
pub enum HeadscaleError {
    /// The configured base URL cannot be used to build request URLs.
    #[error("invalid coordination server URL '{0}'")]
    InvalidUrl(String),

    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("request to coordination server failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("coordination server returned {status}: {body}")]
    Api { status: u16, body: String },
}

impl HeadscaleError {
    /// True when the server rejected the API key.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, HeadscaleError::Api { status: 401 | 403, .. })
    }
}
