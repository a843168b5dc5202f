//! Configuration for the chat client.
//!
//! Configuration is loaded from a TOML file. Every field has a default,
//! so an empty file (or no file at all) yields a usable local setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use veil_chat_core::{ReconnectPolicy, DEFAULT_OUTBOX_CAPACITY, RESEND_COOLDOWN};

/// Longest reconnect delay or jitter a config may ask for (one hour).
pub const MAX_RECONNECT_DELAY_MS: u64 = 60 * 60 * 1000;

/// Root configuration for the chat client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Outbox configuration.
    #[serde(default)]
    pub outbox: OutboxConfig,
    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// WebSocket URL of the realtime backend (default: ws://localhost:4000).
    #[serde(default = "default_server_url")]
    pub url: String,
}

/// Reconnect policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Retries before giving up (default: 8).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First retry delay in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on the exponential delay in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Upper bound of random jitter in milliseconds (default: 1000).
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

/// Outbox configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Sends that may await their echo at once (default: 256).
    #[serde(default = "default_outbox_capacity")]
    pub capacity: usize,
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds before an OTP code may be resent (default: 60).
    #[serde(default = "default_resend_cooldown_secs")]
    pub resend_cooldown_secs: u64,
}

// Default value functions
fn default_server_url() -> String {
    "ws://localhost:4000".to_string()
}

fn default_max_attempts() -> u32 {
    8
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    1000
}

fn default_outbox_capacity() -> usize {
    DEFAULT_OUTBOX_CAPACITY
}

fn default_resend_cooldown_secs() -> u64 {
    RESEND_COOLDOWN.as_secs()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            capacity: default_outbox_capacity(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resend_cooldown_secs: default_resend_cooldown_secs(),
        }
    }
}

impl ReconnectConfig {
    /// Policy for the connection state machine.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the types alone cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.url.trim().is_empty() {
            return Err(ConfigError::Invalid("server.url must not be empty".into()));
        }
        if self.outbox.capacity == 0 {
            return Err(ConfigError::Invalid("outbox.capacity must be at least 1".into()));
        }
        for (name, value) in [
            ("reconnect.max_delay_ms", self.reconnect.max_delay_ms),
            ("reconnect.jitter_ms", self.reconnect.jitter_ms),
        ] {
            if value > MAX_RECONNECT_DELAY_MS {
                return Err(ConfigError::Invalid(format!(
                    "{} ({}) exceeds {}",
                    name, value, MAX_RECONNECT_DELAY_MS
                )));
            }
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "reconnect.base_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Set the backend URL.
    pub fn with_server_url(mut self, url: &str) -> Self {
        self.server.url = url.to_string();
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the outbox capacity.
    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox.capacity = capacity;
        self
    }

    /// OTP resend cooldown.
    pub fn resend_cooldown(&self) -> Duration {
        Duration::from_secs(self.session.resend_cooldown_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();

        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.server.url, "ws://localhost:4000");
        assert_eq!(config.reconnect.policy(), ReconnectPolicy::default());
        assert_eq!(config.outbox.capacity, DEFAULT_OUTBOX_CAPACITY);
        assert_eq!(config.resend_cooldown(), RESEND_COOLDOWN);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            [server]
            url = "wss://chat.example/socket"

            [reconnect]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.server.url, "wss://chat.example/socket");
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.base_delay_ms, 1000);
    }

    #[test]
    fn rejects_empty_url() {
        let result = ClientConfig::from_toml_str("[server]\nurl = \"  \"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_outbox() {
        let result = ClientConfig::default().with_outbox_capacity(0).validate();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_base_delay_above_cap() {
        let reconnect = ReconnectConfig {
            base_delay_ms: 5000,
            max_delay_ms: 100,
            ..ReconnectConfig::default()
        };
        let result = ClientConfig::default().with_reconnect(reconnect).validate();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("base_delay_ms"), "got: {}", err);
    }

    #[test]
    fn rejects_unbounded_jitter_and_delay() {
        let result = ClientConfig::from_toml_str(&format!(
            "[reconnect]\njitter_ms = {}\n",
            i64::MAX
        ));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("jitter_ms"), "got: {}", err);

        let reconnect = ReconnectConfig {
            max_delay_ms: MAX_RECONNECT_DELAY_MS + 1,
            ..ReconnectConfig::default()
        };
        let err = ClientConfig::default()
            .with_reconnect(reconnect)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_delay_ms"), "got: {}", err);

        let reconnect = ReconnectConfig {
            max_delay_ms: MAX_RECONNECT_DELAY_MS,
            jitter_ms: MAX_RECONNECT_DELAY_MS,
            ..ReconnectConfig::default()
        };
        assert!(ClientConfig::default().with_reconnect(reconnect).validate().is_ok());
    }

    #[test]
    fn parse_error_names_the_source() {
        let result = ClientConfig::from_toml_str("[server\nurl=");
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[outbox]\ncapacity = 4\n[session]\nresend_cooldown_secs = 30").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();

        assert_eq!(config.outbox.capacity, 4);
        assert_eq!(config.resend_cooldown(), Duration::from_secs(30));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn builder_helpers() {
        let config = ClientConfig::default().with_server_url("ws://10.0.0.1:9000");
        assert_eq!(config.server.url, "ws://10.0.0.1:9000");
    }
}
