//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Secrets that ship in sample files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["", "changeme", "change-me", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Hugging Face token; empty means anonymous (heavily rate limited).
    pub hf_token: String,
    pub hf_base_url: String,
    /// Budget for each detection or translation call.
    pub provider_timeout: Duration,
    /// Budget for each store call made on the delivery path.
    pub store_timeout: Duration,
    /// Recipients rendered concurrently per message.
    pub fanout_width: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TANDEM_HOST` | `0.0.0.0` |
    /// | `TANDEM_PORT` | `3000` |
    /// | `TANDEM_DB_PATH` | `tandem.db` |
    /// | `TANDEM_JWT_SECRET` | (required) |
    /// | `TANDEM_HF_TOKEN` | empty |
    /// | `TANDEM_HF_BASE_URL` | `https://api-inference.huggingface.co` |
    /// | `TANDEM_PROVIDER_TIMEOUT_MS` | `10000` |
    /// | `TANDEM_STORE_TIMEOUT_MS` | `5000` |
    /// | `TANDEM_FANOUT_WIDTH` | `8` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("TANDEM_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("TANDEM_PORT").unwrap_or_else(|| "3000".to_string());
        let addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(format!("{}:{}", host, port)))?;

        let jwt_secret = lookup("TANDEM_JWT_SECRET").ok_or(ConfigError::MissingJwtSecret)?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            return Err(ConfigError::PlaceholderJwtSecret);
        }

        Ok(Self {
            addr,
            db_path: PathBuf::from(lookup("TANDEM_DB_PATH").unwrap_or_else(|| "tandem.db".to_string())),
            jwt_secret,
            hf_token: lookup("TANDEM_HF_TOKEN").unwrap_or_default(),
            hf_base_url: lookup("TANDEM_HF_BASE_URL")
                .unwrap_or_else(|| "https://api-inference.huggingface.co".to_string()),
            provider_timeout: Duration::from_millis(number(&lookup, "TANDEM_PROVIDER_TIMEOUT_MS", 10_000)?),
            store_timeout: Duration::from_millis(number(&lookup, "TANDEM_STORE_TIMEOUT_MS", 5_000)?),
            fanout_width: number(&lookup, "TANDEM_FANOUT_WIDTH", 8)? as usize,
        })
    }
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) | Err(_) => Err(ConfigError::InvalidNumber(key, raw)),
            Ok(n) => Ok(n),
        },
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid bind address '{0}'")]
    InvalidAddr(String),

    #[error("TANDEM_JWT_SECRET environment variable is required")]
    MissingJwtSecret,

    #[error("TANDEM_JWT_SECRET is a placeholder value; set a real secret")]
    PlaceholderJwtSecret,

    #[error("{0} must be a positive integer, got '{1}'")]
    InvalidNumber(&'static str, String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("TANDEM_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(config.addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.db_path, PathBuf::from("tandem.db"));
        assert_eq!(config.provider_timeout, Duration::from_secs(10));
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.fanout_width, 8);
        assert!(config.hf_token.is_empty());
    }

    #[test]
    fn overrides_are_read() {
        let config = load(&[
            ("TANDEM_JWT_SECRET", "a-real-secret"),
            ("TANDEM_HOST", "127.0.0.1"),
            ("TANDEM_PORT", "8080"),
            ("TANDEM_FANOUT_WIDTH", "2"),
            ("TANDEM_PROVIDER_TIMEOUT_MS", "1500"),
        ])
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.fanout_width, 2);
        assert_eq!(config.provider_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn placeholder_or_missing_secret_is_refused() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingJwtSecret)));
        assert!(matches!(
            load(&[("TANDEM_JWT_SECRET", "dev-secret-change-me")]),
            Err(ConfigError::PlaceholderJwtSecret)
        ));
    }

    #[test]
    fn zero_or_garbage_numbers_are_refused() {
        assert!(matches!(
            load(&[("TANDEM_JWT_SECRET", "s"), ("TANDEM_FANOUT_WIDTH", "0")]),
            Err(ConfigError::InvalidNumber("TANDEM_FANOUT_WIDTH", _))
        ));
        assert!(matches!(
            load(&[("TANDEM_JWT_SECRET", "s"), ("TANDEM_PORT", "http")]),
            Err(ConfigError::InvalidAddr(_))
        ));
    }
}
