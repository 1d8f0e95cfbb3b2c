//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Intake engine configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Local database file, used when no remote URL is configured.
    pub db_path: PathBuf,
    /// Hosted libSQL database URL.
    pub db_url: Option<String>,
    pub db_auth_token: Option<SecretString>,
    /// Identity service base URL. When absent, accounts are created locally.
    pub auth_url: Option<String>,
    pub auth_api_key: Option<SecretString>,
    pub auth_timeout: Duration,
    /// Port for the status HTTP routes.
    pub http_port: u16,
    /// Extra attempts for the bulk merge at account creation.
    pub merge_retries: u32,
    /// Extra attempts for each single-answer remote write.
    pub write_retries: u32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/intake.db"),
            db_url: None,
            db_auth_token: None,
            auth_url: None,
            auth_api_key: None,
            auth_timeout: Duration::from_secs(15),
            http_port: 8080,
            merge_retries: 1,
            write_retries: 1,
        }
    }
}

impl IntakeConfig {
    /// Build config from environment variables, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reject combinations that cannot work at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_url.is_some() && self.db_auth_token.is_none() {
            return Err(ConfigError::InvalidValue {
                key: "INTAKE_DB_AUTH_TOKEN".to_string(),
                message: "required when INTAKE_DB_URL is set".to_string(),
            });
        }
        if let Some(url) = &self.auth_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: "INTAKE_AUTH_URL".to_string(),
                    message: format!("expected an http(s) URL, got {url}"),
                });
            }
        }
        if self.auth_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "INTAKE_AUTH_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| var(key).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let parsed = |key: &str| non_empty(key).and_then(|s| s.parse::<u64>().ok());

        Self {
            db_path: non_empty("INTAKE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            db_url: non_empty("INTAKE_DB_URL"),
            db_auth_token: non_empty("INTAKE_DB_AUTH_TOKEN").map(SecretString::from),
            auth_url: non_empty("INTAKE_AUTH_URL"),
            auth_api_key: non_empty("INTAKE_AUTH_API_KEY").map(SecretString::from),
            auth_timeout: parsed("INTAKE_AUTH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.auth_timeout),
            http_port: parsed("INTAKE_HTTP_PORT")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(defaults.http_port),
            merge_retries: parsed("INTAKE_MERGE_RETRIES")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.merge_retries),
            write_retries: parsed("INTAKE_WRITE_RETRIES")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.write_retries),
        }
    }
}
