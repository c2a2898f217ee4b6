//! Session configuration.
//!
//! # Responsibility
//! - Hold everything a client needs to join a sync session and start logging.
//! - Validate user-supplied settings before any connection is attempted.
//!
//! # Invariants
//! - `validate()` never touches the network or the filesystem.

use crate::logging::default_log_level;
use crate::model::project::ProjectId;
use crate::sync::transport::{ConnectionParams, ReconnectPolicy};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8080/sync";

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Rotating files under an absolute directory.
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub target: LogTarget,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            target: LogTarget::Stderr,
        }
    }
}

/// Settings for one collaborative session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub server_url: String,
    pub display_name: String,
    pub project_id: ProjectId,
    pub user_id: String,
    pub reconnect: ReconnectPolicy,
    pub log: LogConfig,
}

/// Configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyDisplayName,
    EmptyUserId,
    /// Server URL is blank or not `ws://` / `wss://`.
    InvalidServerUrl(String),
    ZeroReconnectAttempts,
    ZeroReconnectDelay,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDisplayName => write!(f, "display name cannot be empty"),
            Self::EmptyUserId => write!(f, "user id cannot be empty"),
            Self::InvalidServerUrl(url) => {
                write!(f, "server url must start with ws:// or wss://, got `{url}`")
            }
            Self::ZeroReconnectAttempts => write!(f, "reconnect attempts must be at least 1"),
            Self::ZeroReconnectDelay => write!(f, "reconnect base delay must be positive"),
        }
    }
}

impl Error for ConfigError {}

impl SessionConfig {
    /// Creates a config with default server, reconnect and log settings and a
    /// fresh user id.
    pub fn new(display_name: impl Into<String>, project_id: ProjectId) -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            display_name: display_name.into(),
            project_id,
            user_id: Uuid::new_v4().to_string(),
            reconnect: ReconnectPolicy::default(),
            log: LogConfig::default(),
        }
    }

    /// Checks settings that would otherwise fail late, at connect time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display_name.trim().is_empty() {
            return Err(ConfigError::EmptyDisplayName);
        }
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::EmptyUserId);
        }
        let url = self.server_url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidServerUrl(url.to_string()));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::ZeroReconnectAttempts);
        }
        if self.reconnect.base_delay.is_zero() {
            return Err(ConfigError::ZeroReconnectDelay);
        }
        Ok(())
    }

    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            server_url: self.server_url.trim().to_string(),
            display_name: self.display_name.trim().to_string(),
            project_id: self.project_id,
            user_id: self.user_id.clone(),
        }
    }
}
