//! Layered settings: config file, then environment, then flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use context_pack_client::config::DEFAULT_API_URL;
use context_pack_client::ClientConfig;
use context_pack_runtime::PollingConfig;
use serde::Deserialize;

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub cancel_grace_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
}

/// Command-line overrides, highest precedence.
#[derive(Debug, Default, Clone)]
pub struct FlagOverrides {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub client: ClientConfig,
    pub polling: PollingConfig,
}

/// `$CONFIG_DIR/context-pack/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("context-pack").join("config.toml"))
}

impl FileSettings {
    /// Read a settings file. A missing file is an empty one.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        toml::from_str(&raw).with_context(|| format!("invalid settings in {}", path.display()))
    }
}

impl Settings {
    pub fn resolve(
        file: FileSettings,
        env: impl Fn(&str) -> Option<String>,
        flags: FlagOverrides,
    ) -> anyhow::Result<Self> {
        let env_poll = match env("CONTEXT_PACK_POLL_MS") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("CONTEXT_PACK_POLL_MS is not a number: {raw:?}"))?,
            ),
            None => None,
        };

        let api_url = flags
            .api_url
            .or_else(|| env("CONTEXT_PACK_API_URL"))
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let token = flags
            .token
            .or_else(|| env("CONTEXT_PACK_TOKEN"))
            .or(file.token)
            .filter(|t| !t.trim().is_empty());

        let mut client = ClientConfig::new(api_url);
        if let Some(token) = token {
            client = client.with_token(token);
        }
        if let Some(secs) = file.request_timeout_secs {
            client = client.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = file.download_timeout_secs {
            client = client.with_download_timeout(Duration::from_secs(secs));
        }

        let mut polling = PollingConfig::default();
        if let Some(ms) = flags.poll_interval_ms.or(env_poll).or(file.poll_interval_ms) {
            anyhow::ensure!(ms > 0, "poll interval must be positive");
            polling = polling.with_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = file.cancel_grace_ms {
            polling = polling.with_cancel_grace(Duration::from_millis(ms));
        }

        Ok(Self { client, polling })
    }
}
