//! Backend client configuration.

use std::time::Duration;

/// Default backend when `CONTEXT_PACK_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Configuration for [`crate::HttpBackend`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// CONTEXT_PACK_API_URL env var, without a trailing slash.
    pub base_url: String,
    /// CONTEXT_PACK_TOKEN env var. Sent as a bearer token when set.
    pub api_token: Option<String>,
    /// Per-request timeout for status, credit and action calls.
    pub request_timeout: Duration,
    /// Hard limit for downloading a finished pack.
    pub download_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            api_token: None,
            request_timeout: Duration::from_secs(15),
            download_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let base_url =
            std::env::var("CONTEXT_PACK_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let mut config = Self::new(base_url);
        config.api_token = std::env::var("CONTEXT_PACK_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        config
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
