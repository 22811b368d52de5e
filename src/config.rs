//! Configuration module for the exporter.
//!
//! Loads probe modules from a YAML file and supports hot reloading via
//! SIGHUP or the `/-/reload` endpoint.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tokio::sync::RwLock;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level exporter configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub modules: HashMap<String, Module>,
}

/// One named probe module.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub http: HttpProbe,
}

/// Settings for one upstream Sentry API target.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpProbe {
    /// Accepted response status codes. Empty means any 2xx.
    #[serde(default)]
    pub valid_status_codes: Vec<u16>,
    /// Base address of the Sentry instance, e.g. `https://sentry.example.com`.
    #[serde(default)]
    pub domain: String,
    /// Organization whose projects are probed.
    #[serde(default)]
    pub organization: String,
    /// Also report each project's configured rate limit.
    #[serde(default)]
    pub ratelimit: bool,
    /// Extra request headers. A `Host` entry sets the virtual host.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub issues: IssuesOptions,
    #[serde(default)]
    pub lag: LagOptions,
}

/// Defaults for the issues prober.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssuesOptions {
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub timeout: Option<Duration>,
    pub period: Option<String>,
    pub above: Option<i64>,
}

/// Defaults for the lag prober.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LagOptions {
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub timeout: Option<Duration>,
}

/// Parse a duration string such as "250ms", "15s", "2m" or "1h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (value, unit) = match s.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: f64 = value.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let seconds = match unit {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return None,
    };
    Some(Duration::from_secs_f64(seconds))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_duration(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {}", s))),
    }
}

/// Shared configuration with hot reload support.
pub struct SharedConfig {
    path: PathBuf,
    config: RwLock<Config>,
}

impl SharedConfig {
    /// Load the config file at `path`, remembering it for later reloads.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = read_config(path.as_ref())?;
        tracing::info!("Loaded config file");
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            config: RwLock::new(config),
        })
    }

    /// Re-read the config file, replacing the current config on success.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        let config = read_config(&self.path)?;
        *self.config.write().await = config;
        tracing::info!("Loaded config file");
        Ok(())
    }

    /// Look up a module by name.
    pub async fn module(&self, name: &str) -> Option<Module> {
        self.config.read().await.modules.get(name).cloned()
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}
