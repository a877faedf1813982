//! Layered settings: built-in defaults, then the TOML file, then CLI flags and env

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use tracing::{debug, info};

use logscope_stream::{ReconnectPolicy, StreamConfig};

/// Contents of `config.toml`; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub token: Option<String>,
    pub initial_lines: Option<usize>,
    pub max_lines: Option<usize>,
    pub reconnect_base_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub poll_lines: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
    pub ws_path: Option<String>,
    pub logs_path: Option<String>,
}

/// Values given on the command line or through the environment
#[derive(Debug, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub token: Option<String>,
    pub initial_lines: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// `~/.config/logscope/config.toml` on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("logscope").join("config.toml"))
    }

    /// Load from `explicit`, or from the default path when it exists.
    ///
    /// A missing default file is not an error; a missing explicit one is.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Merge with `overrides` on top and fill the rest from defaults
    pub fn resolve(self, overrides: Overrides) -> Result<StreamConfig> {
        let defaults = StreamConfig::default();

        let reconnect = ReconnectPolicy::new(
            self.reconnect_base_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.base_delay),
            self.max_reconnect_attempts
                .unwrap_or(defaults.reconnect.max_attempts),
        );
        let poll_interval = self
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        ensure!(!poll_interval.is_zero(), "poll_interval_ms must be positive");

        Ok(StreamConfig {
            server: overrides.server.or(self.server).unwrap_or(defaults.server),
            token: overrides.token.or(self.token).unwrap_or(defaults.token),
            initial_lines: overrides
                .initial_lines
                .or(self.initial_lines)
                .unwrap_or(defaults.initial_lines),
            max_lines: self.max_lines.unwrap_or(defaults.max_lines),
            reconnect,
            poll_interval,
            poll_lines: self.poll_lines.unwrap_or(defaults.poll_lines),
            connect_timeout: overrides
                .connect_timeout_secs
                .or(self.connect_timeout_secs)
                .map(Duration::from_secs),
            ws_path: self.ws_path.unwrap_or(defaults.ws_path),
            logs_path: self.logs_path.unwrap_or(defaults.logs_path),
        })
    }
}
