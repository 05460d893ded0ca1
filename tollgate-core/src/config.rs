//! Session configuration

use crate::error::{ErrorContext, TollgateError, TollgateResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Longest accepted session timeout, one hundred years
pub const MAX_TOKEN_TIMEOUT_MINUTES: i64 = 60 * 24 * 365 * 100;

/// Raw session settings as they appear in a configuration file.
///
/// Both fields are optional at the parsing level so that a missing value is
/// reported by [`SessionsConfig::validate`] instead of a serde error.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// HMAC key used to sign tokens
    pub secret: Option<String>,
    /// Sliding session timeout in minutes
    #[serde(alias = "tokenTimeout")]
    pub token_timeout: Option<i64>,
}

/// Validated session settings consumed by the session manager
#[derive(Clone)]
pub struct SessionSettings {
    pub secret: String,
    pub token_timeout_minutes: i64,
}

impl fmt::Debug for SessionsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionsConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("token_timeout", &self.token_timeout)
            .finish()
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("secret", &"<redacted>")
            .field("token_timeout_minutes", &self.token_timeout_minutes)
            .finish()
    }
}

impl SessionsConfig {
    pub fn new(secret: impl Into<String>, token_timeout: i64) -> Self {
        Self {
            secret: Some(secret.into()),
            token_timeout: Some(token_timeout),
        }
    }

    /// Load a standalone sessions config from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> TollgateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TollgateError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        toml::from_str(&content).map_err(|e| TollgateError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    /// Validate the configuration. Any failure here is fatal at startup.
    pub fn validate(&self) -> TollgateResult<SessionSettings> {
        let secret = match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            Some(_) => {
                return Err(TollgateError::Config {
                    message: "Invalid secret: must not be empty".to_string(),
                    source: None,
                    context: ErrorContext::new("config")
                        .with_operation("validate")
                        .with_suggestion("Set sessions.secret to a long random string"),
                })
            }
            None => {
                return Err(TollgateError::Config {
                    message: "Invalid secret: sessions.secret is required".to_string(),
                    source: None,
                    context: ErrorContext::new("config")
                        .with_operation("validate")
                        .with_suggestion("Set sessions.secret or TOLLGATE_SECRET"),
                })
            }
        };

        let token_timeout_minutes = match self.token_timeout {
            Some(minutes) if minutes > MAX_TOKEN_TIMEOUT_MINUTES => {
                return Err(TollgateError::Config {
                    message: format!(
                        "Invalid tokenTimeout: {} (must be at most {} minutes)",
                        minutes, MAX_TOKEN_TIMEOUT_MINUTES
                    ),
                    source: None,
                    context: ErrorContext::new("config")
                        .with_operation("validate")
                        .with_suggestion("Set sessions.token_timeout to a realistic number of minutes"),
                })
            }
            Some(minutes) if minutes > 0 => minutes,
            Some(minutes) => {
                return Err(TollgateError::Config {
                    message: format!("Invalid tokenTimeout: {} (must be positive)", minutes),
                    source: None,
                    context: ErrorContext::new("config")
                        .with_operation("validate")
                        .with_suggestion("Set sessions.token_timeout to a number of minutes"),
                })
            }
            None => {
                return Err(TollgateError::Config {
                    message: "Invalid tokenTimeout: sessions.token_timeout is required"
                        .to_string(),
                    source: None,
                    context: ErrorContext::new("config")
                        .with_operation("validate")
                        .with_suggestion("Set sessions.token_timeout or TOLLGATE_TOKEN_TIMEOUT"),
                })
            }
        };

        Ok(SessionSettings {
            secret,
            token_timeout_minutes,
        })
    }
}
