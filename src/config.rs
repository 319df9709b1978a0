//! Pipeline configuration, loadable from explicit values, a JSON file, or
//! environment variables.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::Error;

pub const DEFAULT_ACCESS_KEY: &str = "access_token";
pub const DEFAULT_REFRESH_KEY: &str = "refresh_token";
pub const DEFAULT_REFRESH_PATH: &str = "/refresh_token";

const DEFAULT_TIMEOUT_SECS: u64 = 20;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Base URL every target path is resolved against.
    pub base_url: String,
    /// Path of the refresh endpoint, relative to `base_url`.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Storage key for the access credential; also the payload key the
    /// refresh endpoint responds with and the query parameter name the
    /// refresh credential is sent under.
    #[serde(default = "default_access_key")]
    pub access_key: String,
    /// Storage/payload key for the refresh credential.
    #[serde(default = "default_refresh_key")]
    pub refresh_key: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Timeout for the refresh call itself, bounding how long queued callers
    /// can stay suspended. Defaults to the request timeout.
    #[serde(default)]
    pub refresh_timeout_secs: Option<u64>,
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_access_key() -> String {
    DEFAULT_ACCESS_KEY.to_string()
}

fn default_refresh_key() -> String {
    DEFAULT_REFRESH_KEY.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Config {
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let base_url = base_url.into();
        let _ = reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        Ok(Self {
            base_url,
            refresh_path: default_refresh_path(),
            access_key: default_access_key(),
            refresh_key: default_refresh_key(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            refresh_timeout_secs: None,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()
    }

    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("PIPELINE_BASE_URL")
            .map_err(|_| Error::Config("Missing PIPELINE_BASE_URL env var".to_string()))?;
        let mut config = Config::new(base_url)?;
        if let Ok(path) = std::env::var("PIPELINE_REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Ok(secs) = std::env::var("PIPELINE_TIMEOUT_SECS") {
            config.timeout_secs = secs
                .parse()
                .map_err(|_| Error::Config("PIPELINE_TIMEOUT_SECS must be an integer".to_string()))?;
        }
        Ok(config)
    }

    fn validate(self) -> Result<Self, Error> {
        let _ = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", self.base_url, e)))?;
        if !self.refresh_path.starts_with('/') {
            return Err(Error::Config(format!(
                "Refresh path must start with '/', got '{}'",
                self.refresh_path
            )));
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs.unwrap_or(self.timeout_secs))
    }

    /// Absolute URL of the refresh endpoint.
    pub fn refresh_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.refresh_path)
    }
}
