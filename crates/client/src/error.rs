use std::time::Duration;

use thiserror::Error;

/// Errors talking to the Context Pack backend.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request to {url} timed out after {}s", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },

    #[error("Network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API error {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Malformed response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Builder(#[source] reqwest::Error),
}

impl ClientError {
    pub fn network(url: impl Into<String>, timeout: Duration, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url, timeout }
        } else {
            Self::Network { url, source }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// HTTP status for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
