//! Client configuration.
//!
//! Resolved in layers, later layers winning:
//! 1. Built-in defaults
//! 2. A TOML file (optional)
//! 3. `DRKR_*` environment variables

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DrkrError, DrkrResult};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Interval between status polls of a running job.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

pub const ENV_API_URL: &str = "DRKR_API_URL";
pub const ENV_API_TOKEN: &str = "DRKR_API_TOKEN";
pub const ENV_POLL_INTERVAL_SECS: &str = "DRKR_POLL_INTERVAL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "DRKR_REQUEST_TIMEOUT_SECS";

/// Settings for the HTTP client and the job controller.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the DRKR API, without the `/api` prefix.
    pub base_url: String,
    /// Static bearer token; leave unset to authenticate through a custom
    /// token provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> DrkrResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| DrkrError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> DrkrResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DrkrError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults, then `path` if it exists, then the process environment.
    pub fn load(path: Option<&Path>) -> DrkrResult<Self> {
        let base = match path {
            Some(path) if path.exists() => Self::from_toml_file(path)?,
            _ => Self::default(),
        };
        base.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `DRKR_*` overrides read through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> DrkrResult<Self> {
        if let Some(url) = lookup(ENV_API_URL) {
            self.base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.api_token = (!token.is_empty()).then_some(token);
        }
        if let Some(secs) = lookup(ENV_POLL_INTERVAL_SECS) {
            self.poll_interval_secs = parse_secs(ENV_POLL_INTERVAL_SECS, &secs)?;
        }
        if let Some(secs) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = parse_secs(ENV_REQUEST_TIMEOUT_SECS, &secs)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> DrkrResult<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(DrkrError::Configuration("base_url is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DrkrError::Configuration(format!(
                "base_url must be http(s): {url}"
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(DrkrError::Configuration(
                "poll_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn api_root(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn parse_secs(key: &str, raw: &str) -> DrkrResult<u64> {
    raw.trim()
        .parse()
        .map_err(|_| DrkrError::Configuration(format!("{key} must be whole seconds, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_root(), "http://localhost:8000");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_override() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "https://drkr.example.com/"
            poll_interval_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.api_root(), "https://drkr.example.com");
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_toml_rejects_unknown_keys_and_bad_values() {
        assert!(ClientConfig::from_toml_str("poll_interval = 3").is_err());
        assert!(ClientConfig::from_toml_str("poll_interval_secs = 0").is_err());
        assert!(ClientConfig::from_toml_str(r#"base_url = "ftp://x""#).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_URL, "https://api.drkr.dev"),
            (ENV_API_TOKEN, "tok"),
            (ENV_POLL_INTERVAL_SECS, "10"),
        ]);
        let config = ClientConfig::default()
            .with_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.base_url, "https://api.drkr.dev");
        assert_eq!(config.api_token.as_deref(), Some("tok"));
        assert_eq!(config.poll_interval_secs, 10);
        assert!(!format!("{config:?}").contains("tok\""));
    }

    #[test]
    fn test_env_rejects_non_numeric_interval() {
        let err = ClientConfig::default()
            .with_env_overrides(|key| (key == ENV_POLL_INTERVAL_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, DrkrError::Configuration(_)));
    }
}
