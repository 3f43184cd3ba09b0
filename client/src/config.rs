//! Configuration management for the client.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Integration token for the remote API; absent until the user connects
    pub api_key: Option<String>,
    /// Remote API base URL
    pub api_url: String,
    /// Value of the API version header
    pub api_version: String,
    /// Directory of the cross-process store shared with the widget
    pub shared_dir: PathBuf,
    /// Directory of the process-local fallback store
    pub local_dir: PathBuf,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.notion.com/v1".to_string(),
            api_version: "2022-06-28".to_string(),
            shared_dir: PathBuf::from("./data/shared"),
            local_dir: PathBuf::from("./data/local"),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let api_key = env::var("TASKDECK_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let api_url = match env::var("TASKDECK_API_URL") {
            Ok(raw) => parse_api_url(&raw)?,
            Err(_) => defaults.api_url,
        };

        let api_version = env::var("TASKDECK_API_VERSION").unwrap_or(defaults.api_version);

        let shared_dir = env::var("TASKDECK_SHARED_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.shared_dir);
        let local_dir = env::var("TASKDECK_LOCAL_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.local_dir);

        let timeout = match env::var("TASKDECK_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidTimeout(raw))?,
            Err(_) => defaults.timeout,
        };

        Ok(Self {
            api_key,
            api_url,
            api_version,
            shared_dir,
            local_dir,
            timeout,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Validate an API base URL: absolute, http(s), with a host.
fn parse_api_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|_| ConfigError::InvalidApiUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidApiUrl(raw.to_string()));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TASKDECK_TIMEOUT_SECS value: {0}")]
    InvalidTimeout(String),

    #[error("Invalid TASKDECK_API_URL value: {0}")]
    InvalidApiUrl(String),
}
