use std::collections::HashMap;
use std::env;
use std::fmt;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_PAGE: usize = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// libSQL database file; in-memory when unset
    pub db_path: Option<String>,
    /// Upper bound on records returned by one list call
    pub max_page: usize,
    /// Bearer token required on `/v1` routes when set
    pub api_token: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("max_page", &self.max_page)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            db_path: None,
            max_page: DEFAULT_MAX_PAGE,
            api_token: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "STRIDE_API_BIND_ADDR", DEFAULT_BIND_ADDR);
        let db_path = optional_trimmed(&lookup, "STRIDE_API_DB_PATH");
        let api_token = optional_trimmed(&lookup, "STRIDE_API_TOKEN");

        let max_page = value_or_default(&lookup, "STRIDE_API_MAX_PAGE", "1000")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "STRIDE_API_MAX_PAGE must be an integer in [1, 5000]".to_string(),
                )
            })?;
        if !(1..=5_000).contains(&max_page) {
            return Err(ConfigError::Invalid(
                "STRIDE_API_MAX_PAGE must be in [1, 5000]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            db_path,
            max_page,
            api_token,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn config_defaults_to_local_in_memory_store() {
        let map: HashMap<&str, &str> = HashMap::new();
        let config =
            AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string())).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, None);
        assert_eq!(config.max_page, 1000);
        assert_eq!(config.api_token, None);
    }

    #[test]
    fn config_rejects_out_of_range_page_size() {
        let map = HashMap::from([("STRIDE_API_MAX_PAGE", "0")]);
        let err = AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("STRIDE_API_MAX_PAGE"));
    }

    #[test]
    fn config_redacts_token_in_debug_output() {
        let map = HashMap::from([("STRIDE_API_TOKEN", "sensitive-api-token")]);
        let config =
            AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string())).unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-api-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
