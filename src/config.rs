//! Server configuration.
//!
//! Every key has a default, so an empty YAML document is a valid config.
//! The `LISTEN` environment variable (`host:port`) overrides `bind` and
//! `port` for [`Config::load`] and [`Config::from_file`].

use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid LISTEN address: {0}")]
    InvalidListen(String),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Whether a connection may serve more than one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPolicy {
    /// Close after exactly one response, whatever the client asked for.
    #[default]
    AlwaysClose,
    /// Follow HTTP/1.x persistence rules and the `Connection` header.
    Negotiate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// Maximum accepted request body, in bytes.
    #[serde(deserialize_with = "deserialize_size")]
    pub body_size_limit: usize,
    /// Idle ticks after which a connection is reaped.
    pub keepalive_timeout: u64,
    pub tick_interval_ms: u64,
    pub blob_fallback: bool,
    pub fallback_delimiter: String,
    pub default_tag: Option<String>,
    pub record_remote_host: bool,
    pub remote_address_key: String,
    pub remote_address_dns_key: String,
    pub connection_policy: ConnectionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9880,
            body_size_limit: 32 * 1024 * 1024,
            keepalive_timeout: 10,
            tick_interval_ms: 1000,
            blob_fallback: false,
            fallback_delimiter: "\n".to_string(),
            default_tag: None,
            record_remote_host: false,
            remote_address_key: "remote_addr".to_string(),
            remote_address_dns_key: "host".to_string(),
            connection_policy: ConnectionPolicy::AlwaysClose,
        }
    }
}

impl Config {
    /// Defaults, overridden by the `LISTEN` environment variable.
    pub fn load() -> Self {
        let mut cfg = Self::default();
        if let Err(e) = cfg.apply_env() {
            tracing::warn!(error = %e, "ignoring LISTEN override");
        }
        cfg
    }

    /// Reads a YAML file, then applies the `LISTEN` override.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut cfg = Self::from_yaml(&content)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document for a struct
        let cfg: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(listen) = std::env::var("LISTEN") {
            self.set_listen(&listen)?;
        }
        Ok(())
    }

    /// Sets `bind` and `port` from a `host:port` string.
    pub fn set_listen(&mut self, listen: &str) -> Result<(), ConfigError> {
        let (host, port) = listen
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidListen(listen.to_string()))?;
        let port = port
            .parse()
            .map_err(|_| ConfigError::InvalidListen(listen.to_string()))?;
        self.bind = host.trim_start_matches('[').trim_end_matches(']').to_string();
        self.port = port;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.body_size_limit == 0 {
            return Err(ConfigError::Invalid("body_size_limit must be positive"));
        }
        if self.keepalive_timeout == 0 {
            return Err(ConfigError::Invalid("keepalive_timeout must be positive"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive"));
        }
        if self.blob_fallback && self.fallback_delimiter.is_empty() {
            return Err(ConfigError::Invalid("fallback_delimiter must not be empty"));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        if self.bind.contains(':') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Parses `1024`, `512k`, `10m`, `1g` (binary multiples, case-insensitive).
pub fn parse_size(input: &str) -> Option<usize> {
    let s = input.trim().to_ascii_lowercase();
    let (digits, multiplier) = match s.chars().last()? {
        'k' => (&s[..s.len() - 1], 1usize << 10),
        'm' => (&s[..s.len() - 1], 1 << 20),
        'g' => (&s[..s.len() - 1], 1 << 30),
        _ => (s.as_str(), 1),
    };
    digits.trim().parse::<usize>().ok()?.checked_mul(multiplier)
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(usize),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Bytes(n) => Ok(n),
        Size::Text(s) => parse_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid size: {s}"))),
    }
}
