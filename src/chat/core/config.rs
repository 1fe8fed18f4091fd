//! Configuration for the chat streaming subsystem.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::core::errors::{ChatError, ChatResult};

/// Env var naming a JSON config file.
pub const ENV_CONFIG_PATH: &str = "CHAT_CONSOLE_CONFIG";
/// Env var overriding the endpoint template.
pub const ENV_ENDPOINT: &str = "CHAT_CONSOLE_ENDPOINT";
/// Env var overriding the base URL used for relative templates.
pub const ENV_BASE_URL: &str = "CHAT_CONSOLE_BASE_URL";
/// Env var carrying the session credential.
pub const ENV_TOKEN: &str = "CHAT_CONSOLE_TOKEN";
/// Env var overriding the connect timeout, in seconds.
pub const ENV_CONNECT_TIMEOUT: &str = "CHAT_CONSOLE_CONNECT_TIMEOUT_SECS";
/// Env var with endpoint parameters as `k=v,k=v`.
pub const ENV_PARAMS: &str = "CHAT_CONSOLE_PARAMS";

/// Top-level configuration for a chat session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Endpoint template; `${name}` placeholders are filled from `params`.
    pub endpoint_template: String,
    /// Base URL that relative templates are resolved against.
    pub base_url: Option<String>,
    /// Default endpoint parameters.
    pub params: BTreeMap<String, String>,
    /// Session credential, appended as the `token` query parameter.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Upper bound for the websocket handshake.
    pub connect_timeout_secs: u64,
    /// Buffered state transitions per subscriber before it lags.
    pub transition_capacity: usize,
    /// Inbound events buffered before the connection stops reading.
    pub event_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint_template: "ws://127.0.0.1:3000/ai/chat".to_string(),
            base_url: None,
            params: BTreeMap::new(),
            token: None,
            connect_timeout_secs: 10,
            transition_capacity: 32,
            event_capacity: 256,
        }
    }
}

impl ChatConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the result is invalid.
    pub fn from_json_str(raw: &str) -> ChatResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> ChatResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Load from `CHAT_CONSOLE_CONFIG` (when set) and apply env overrides.
    ///
    /// # Errors
    /// Returns an error if the config file or an override is invalid.
    pub fn from_env() -> ChatResult<Self> {
        let base = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process env in production).
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed.
    pub fn with_overrides<F>(mut self, lookup: F) -> ChatResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint_template = endpoint;
        }
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.base_url = Some(base_url);
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.token = Some(token);
        }
        if let Some(timeout) = lookup(ENV_CONNECT_TIMEOUT) {
            self.connect_timeout_secs = timeout.trim().parse().map_err(|_| {
                ChatError::InvalidConfig(format!("{ENV_CONNECT_TIMEOUT} is not a number: {timeout}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_PARAMS) {
            self.params.extend(parse_params(&raw)?);
        }
        Ok(self)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        if self.endpoint_template.trim().is_empty() {
            return Err(ChatError::InvalidConfig(
                "endpoint_template must not be empty".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ChatError::InvalidConfig(
                "connect_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.transition_capacity == 0 {
            return Err(ChatError::InvalidConfig(
                "transition_capacity must be > 0".to_string(),
            ));
        }

        if self.event_capacity == 0 {
            return Err(ChatError::InvalidConfig(
                "event_capacity must be > 0".to_string(),
            ));
        }

        if let Some(base_url) = &self.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }

    /// Connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn parse_params(raw: &str) -> ChatResult<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ChatError::InvalidConfig(format!(
                "{ENV_PARAMS} entry is not key=value: {pair}"
            )));
        };
        params.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(params)
}
