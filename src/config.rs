use crate::refresh::RefreshTrigger;
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://chezflora-api.onrender.com/api/";

pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";

pub const ENV_API_URL: &str = "CHEZFLORA_API_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "CHEZFLORA_HTTP_TIMEOUT_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "CHEZFLORA_CONNECT_TIMEOUT_SECS";
pub const ENV_REFRESH_TRIGGER: &str = "CHEZFLORA_REFRESH_TRIGGER";

const KEYRING_SERVICE: &str = "com.chezflora.client";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid base url `{value}`")]
  InvalidBaseUrl { value: String },
  #[error("cannot build a url for `{path}`")]
  InvalidPath { path: String },
  #[error("invalid value for {key}: `{value}`")]
  InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub base_url: Url,
  pub timeout: Duration,
  pub connect_timeout: Duration,
  pub access_token_key: String,
  pub refresh_token_key: String,
  pub keyring_service: String,
  pub refresh_trigger: RefreshTrigger,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
      timeout: Duration::from_secs(40),
      connect_timeout: Duration::from_secs(10),
      access_token_key: KEY_ACCESS_TOKEN.to_string(),
      refresh_token_key: KEY_REFRESH_TOKEN.to_string(),
      keyring_service: KEYRING_SERVICE.to_string(),
      refresh_trigger: RefreshTrigger::default(),
    }
  }
}

/// Parses a base URL, forcing a trailing slash so that relative paths join
/// under it instead of replacing its last segment.
pub fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
  let trimmed = value.trim();
  let normalized = if trimmed.ends_with('/') {
    trimmed.to_string()
  } else {
    format!("{trimmed}/")
  };
  let url = Url::parse(&normalized).map_err(|_| ConfigError::InvalidBaseUrl {
    value: value.to_string(),
  })?;
  if url.cannot_be_a_base() {
    return Err(ConfigError::InvalidBaseUrl {
      value: value.to_string(),
    });
  }
  Ok(url)
}

fn parse_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
  value
    .trim()
    .parse::<u64>()
    .ok()
    .filter(|secs| *secs > 0)
    .map(Duration::from_secs)
    .ok_or_else(|| ConfigError::InvalidValue {
      key,
      value: value.to_string(),
    })
}

impl ClientConfig {
  pub fn with_base_url(mut self, value: &str) -> Result<Self, ConfigError> {
    self.base_url = parse_base_url(value)?;
    Ok(self)
  }

  pub fn with_refresh_trigger(mut self, trigger: RefreshTrigger) -> Self {
    self.refresh_trigger = trigger;
    self
  }

  /// Defaults overridden by `CHEZFLORA_*` environment variables.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let mut config = Self::default();
    if let Some(value) = read(ENV_API_URL) {
      config.base_url = parse_base_url(&value)?;
    }
    if let Some(value) = read(ENV_HTTP_TIMEOUT_SECS) {
      config.timeout = parse_secs(ENV_HTTP_TIMEOUT_SECS, &value)?;
    }
    if let Some(value) = read(ENV_CONNECT_TIMEOUT_SECS) {
      config.connect_timeout = parse_secs(ENV_CONNECT_TIMEOUT_SECS, &value)?;
    }
    if let Some(value) = read(ENV_REFRESH_TRIGGER) {
      config.refresh_trigger =
        RefreshTrigger::parse(&value).ok_or(ConfigError::InvalidValue {
          key: ENV_REFRESH_TRIGGER,
          value,
        })?;
    }
    Ok(config)
  }

  pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|_| ConfigError::InvalidPath {
        path: path.to_string(),
      })
  }
}
