use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::http::connection::ConnectionSettings;
use crate::http::parser::ParserLimits;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "WEBSERV_CONFIG";
/// Environment variable overriding `server.listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

/// Server configuration.
///
/// Every section and field has a default, so an empty document is valid:
///
/// ```yaml
/// server:
///   listen_addr: 0.0.0.0:8080
///   backlog: 1024
/// limits:
///   max_header_bytes: 8192
///   max_body_bytes: 10485760
///   max_connections: 1024
/// timeouts:
///   idle_secs: 30
///   handler_secs: 30
///   shutdown_grace_secs: 10
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            backlog: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    pub max_connections: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let parser = ParserLimits::default();
        Self {
            max_header_bytes: parser.max_header_bytes,
            max_body_bytes: parser.max_body_bytes,
            max_connections: 1024,
        }
    }
}

/// Timeouts, in seconds. Fractions are allowed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutsConfig {
    #[serde(rename = "idle_secs", deserialize_with = "secs")]
    pub idle: Duration,
    #[serde(rename = "handler_secs", deserialize_with = "secs")]
    pub handler: Duration,
    #[serde(rename = "shutdown_grace_secs", deserialize_with = "secs")]
    pub shutdown_grace: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(30),
            handler: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

fn secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl Config {
    /// Loads the file named by `WEBSERV_CONFIG` if set, else the defaults,
    /// then applies the `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        // An empty document deserializes as unit, not as a mapping.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies the `LISTEN` environment override.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var(LISTEN_ENV) {
            self.server.listen_addr = addr;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.limits.max_connections > 0, "limits.max_connections must be positive");
        anyhow::ensure!(self.limits.max_header_bytes > 0, "limits.max_header_bytes must be positive");
        anyhow::ensure!(!self.timeouts.idle.is_zero(), "timeouts.idle_secs must be positive");
        anyhow::ensure!(!self.timeouts.handler.is_zero(), "timeouts.handler_secs must be positive");
        Ok(())
    }

    pub fn parser_limits(&self) -> ParserLimits {
        ParserLimits {
            max_header_bytes: self.limits.max_header_bytes,
            max_body_bytes: self.limits.max_body_bytes,
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            limits: self.parser_limits(),
            idle_timeout: self.timeouts.idle,
        }
    }
}
