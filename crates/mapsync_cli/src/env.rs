//! Process environment configuration.
//!
//! This is the only place that reads the environment; everything below
//! the CLI takes explicit configuration.

use mapsync_sync_engine::CursorMode;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors reading configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} is required but not set")]
    Missing(&'static str),

    /// A variable is set to something unusable.
    #[error("invalid {key}: {message}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Settings read from the environment, overridable from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvConfig {
    /// Upstream base URL (`NODE_URL`).
    pub node_url: Option<String>,
    /// Store directory (`STORE_PATH`).
    pub store_path: PathBuf,
    /// Trigger secret (`API_SECRET_KEY`).
    pub api_secret_key: Option<String>,
    /// Per-request timeout (`FETCH_TIMEOUT_SECS`).
    pub fetch_timeout: Duration,
    /// Cursor mode (`SYNC_MODE`).
    pub sync_mode: CursorMode,
    /// Trigger bind address (`TRIGGER_ADDR`).
    pub trigger_addr: SocketAddr,
    /// Trigger method (`TRIGGER_METHOD`).
    pub trigger_method: String,
    /// Trigger route (`TRIGGER_PATH`).
    pub trigger_path: String,
}

impl EnvConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let fetch_timeout = match var("FETCH_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                    key: "FETCH_TIMEOUT_SECS",
                    message: format!("{e}"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        key: "FETCH_TIMEOUT_SECS",
                        message: "must be at least 1".into(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(5),
        };

        let sync_mode = match var("SYNC_MODE") {
            Some(raw) => raw.parse::<CursorMode>().map_err(|message| ConfigError::Invalid {
                key: "SYNC_MODE",
                message,
            })?,
            None => CursorMode::default(),
        };

        let trigger_addr = match var("TRIGGER_ADDR") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "TRIGGER_ADDR",
                message: format!("{e}"),
            })?,
            None => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        Ok(Self {
            node_url: var("NODE_URL"),
            store_path: var("STORE_PATH").map_or_else(|| PathBuf::from("./mapdata"), PathBuf::from),
            // An empty secret is still a secret: it expects `Bearer `.
            api_secret_key: lookup("API_SECRET_KEY"),
            fetch_timeout,
            sync_mode,
            trigger_addr,
            trigger_method: var("TRIGGER_METHOD").unwrap_or_else(|| "GET".into()),
            trigger_path: var("TRIGGER_PATH").unwrap_or_else(|| "/api".into()),
        })
    }

    /// Returns the upstream URL.
    pub fn require_node_url(&self) -> Result<&str, ConfigError> {
        self.node_url.as_deref().ok_or(ConfigError::Missing("NODE_URL"))
    }
}
