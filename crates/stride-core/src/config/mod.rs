//! Client configuration resolved from the environment.
//!
//! The CLI (and any other client) reads these values once at startup; the
//! sync engine itself never touches the environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PULL_PAGE_SIZE: usize = 500;
const DEFAULT_FORCE_SYNC_LIMIT: usize = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for reaching the authoritative store and sizing sync pages.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the authoritative store (`STRIDE_API_URL`)
    pub api_url: Option<String>,
    /// Bearer token sent with every request (`STRIDE_API_TOKEN`)
    pub api_token: Option<String>,
    /// Per-request timeout (`STRIDE_REQUEST_TIMEOUT_SECS`)
    pub request_timeout: Duration,
    /// Maximum records fetched per pull (`STRIDE_PULL_PAGE_SIZE`)
    pub pull_page_size: usize,
    /// Maximum records restored by a force resync (`STRIDE_FORCE_SYNC_LIMIT`)
    pub force_sync_limit: usize,
    /// Local database override (`STRIDE_DB_PATH`)
    pub db_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            pull_page_size: DEFAULT_PULL_PAGE_SIZE,
            force_sync_limit: DEFAULT_FORCE_SYNC_LIMIT,
            db_path: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .field("pull_page_size", &self.pull_page_size)
            .field("force_sync_limit", &self.force_sync_limit)
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = normalize_text_option(lookup("STRIDE_API_URL"))
            .map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = api_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "STRIDE_API_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        let api_token = normalize_text_option(lookup("STRIDE_API_TOKEN"));

        let timeout_secs = parse_bounded(
            &lookup,
            "STRIDE_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
            1..=120,
        )?;
        let pull_page_size = parse_bounded(
            &lookup,
            "STRIDE_PULL_PAGE_SIZE",
            DEFAULT_PULL_PAGE_SIZE,
            1..=1000,
        )?;
        let force_sync_limit = parse_bounded(
            &lookup,
            "STRIDE_FORCE_SYNC_LIMIT",
            DEFAULT_FORCE_SYNC_LIMIT,
            1..=5000,
        )?;

        let db_path = normalize_text_option(lookup("STRIDE_DB_PATH")).map(PathBuf::from);

        Ok(Self {
            api_url,
            api_token,
            request_timeout: Duration::from_secs(timeout_secs),
            pull_page_size,
            force_sync_limit,
            db_path,
        })
    }

    /// Whether an authoritative store is configured
    pub const fn is_sync_configured(&self) -> bool {
        self.api_url.is_some()
    }
}

fn parse_bounded<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: std::ops::RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + fmt::Display + Copy,
{
    let Some(raw) = normalize_text_option(lookup(name)) else {
        return Ok(default);
    };
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = raw.parse::<T>().map_err(|_| invalid())?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(!config.is_sync_configured());
    }

    #[test]
    fn rejects_url_without_scheme() {
        let error =
            ClientConfig::from_lookup(lookup_from(&[("STRIDE_API_URL", "api.example.com")]))
                .unwrap_err();
        assert!(error.to_string().contains("STRIDE_API_URL"));
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        let error =
            ClientConfig::from_lookup(lookup_from(&[("STRIDE_PULL_PAGE_SIZE", "0")])).unwrap_err();
        assert!(error.to_string().contains("STRIDE_PULL_PAGE_SIZE"));

        let error = ClientConfig::from_lookup(lookup_from(&[(
            "STRIDE_REQUEST_TIMEOUT_SECS",
            "soon",
        )]))
        .unwrap_err();
        assert!(error.to_string().contains("STRIDE_REQUEST_TIMEOUT_SECS"));
    }

    #[test]
    fn parses_full_configuration() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("STRIDE_API_URL", "https://api.example.com/"),
            ("STRIDE_API_TOKEN", "secret"),
            ("STRIDE_REQUEST_TIMEOUT_SECS", "30"),
            ("STRIDE_PULL_PAGE_SIZE", "200"),
            ("STRIDE_FORCE_SYNC_LIMIT", "50"),
            ("STRIDE_DB_PATH", "/tmp/stride.db"),
        ]))
        .unwrap();

        assert_eq!(config.api_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.pull_page_size, 200);
        assert_eq!(config.force_sync_limit, 50);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/stride.db")));
        assert!(config.is_sync_configured());
    }

    #[test]
    fn debug_redacts_token() {
        let config =
            ClientConfig::from_lookup(lookup_from(&[("STRIDE_API_TOKEN", "sensitive-token")]))
                .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sensitive-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
