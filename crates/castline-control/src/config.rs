//! Control channel configuration.

use std::time::Duration;
use tokio_tungstenite::tungstenite::http::Uri;

/// Delay between a lost connection and the next attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Where the remote controller lives and how to authenticate it.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// WebSocket URL of the remote controller (`ws://` or `wss://`).
    pub url: String,
    /// Shared secret the controller must prove knowledge of.
    pub password: String,
    pub retry_delay: Duration,
}

impl ControlConfig {
    pub fn new(url: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            password: password.into(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Reject configurations the engine could never connect with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri: Uri = self
            .url
            .parse()
            .map_err(|_| ConfigError::InvalidUrl(self.url.clone()))?;
        match uri.scheme_str() {
            Some("ws") | Some("wss") => {}
            other => {
                return Err(ConfigError::UnsupportedScheme(
                    other.unwrap_or_default().to_string(),
                ));
            }
        }
        if uri.host().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingHost);
        }
        if self.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }
        Ok(())
    }
}

/// Error validating a [`ControlConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed URL: {0}")]
    InvalidUrl(String),
    #[error("URL scheme must be ws or wss, got '{0}'")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("password cannot be empty")]
    EmptyPassword,
}
