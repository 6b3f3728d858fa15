//! Board connection settings.

use serde::{Deserialize, Serialize};

/// Default port of the board's remote-object service.
pub const DEFAULT_PORT: u16 = 18861;

/// Default number of automatic reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Where the board lives and how hard to try reaching it.
///
/// Supplied once at device initialization and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Hostname or IP address of the board
    pub host: String,

    /// Remote-object service port (default: 18861)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Automatic reconnects before giving up (default: 10)
    #[serde(default = "default_max_reconnect_attempts", alias = "reconnect")]
    pub max_reconnect_attempts: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

impl ConnectionConfig {
    /// Settings for `host` with default port and retry budget.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }

    /// Override the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the retry budget.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Reject settings that can never produce a connection.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("'host' field cannot be empty");
        }
        if self.port == 0 {
            anyhow::bail!("'port' field cannot be 0");
        }
        Ok(())
    }
}
