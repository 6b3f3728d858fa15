//! Error types for the board session.
//!
//! Failures fall into two families that drive the operating state in
//! different directions:
//!
//! - **[`ConnectionError`]**: the transport to the board itself is down. Every
//!   register-level operation is affected. Always reported as `FAULT` and
//!   feeds the bounded reconnect path.
//! - **[`ApplicationError`]**: the companion acquisition application on the
//!   board host is unreachable or answered with a non-`OK` status. Only
//!   acquisition is affected. Always reported as `STANDBY`.
//!
//! [`BoardError`] aggregates both together with caller mistakes (invalid
//! channel, unknown attribute, ...). The structured fields are rendered to
//! human-readable text only when the error becomes a status message.

use crate::config::ConnectionConfig;
use std::fmt;
use thiserror::Error;

/// Convenience alias for results carrying a [`BoardError`].
pub type BoardResult<T> = std::result::Result<T, BoardError>;

// =============================================================================
// Connection Errors
// =============================================================================

/// The board transport could not be opened or stopped answering.
///
/// Carries the retry bookkeeping that was current when the failure happened,
/// so the rendered message can tell the operator how many automatic
/// reconnects are left.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    /// Board hostname
    pub host: String,
    /// Board port
    pub port: u16,
    /// Raw error text from the transport
    pub message: String,
    /// `reconnect_tries` at the time of the failure
    pub attempt: u32,
    /// Configured `max_reconnect_attempts`
    pub max_attempts: u32,
}

impl ConnectionError {
    /// Build an error for the configured board.
    pub fn new(config: &ConnectionConfig, message: impl Into<String>, attempt: u32) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            message: message.into(),
            attempt,
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// True once no automatic reconnect will be attempted anymore.
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Could not connect to the board @ {}:{}",
            self.host, self.port
        )?;
        writeln!(f, "Error message: {}", self.message)?;
        writeln!(
            f,
            "Reconnect attempt {} / {}",
            self.attempt, self.max_attempts
        )?;
        if self.exhausted() {
            write!(f, "Not trying again.")?;
        }
        Ok(())
    }
}

// =============================================================================
// Application Errors
// =============================================================================

/// What went wrong while talking to the companion acquisition application.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppFailure {
    /// The HTTP request itself failed (host unreachable, timeout, ...).
    #[error("{0}")]
    Transport(String),

    /// The response body was not the expected JSON envelope.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The application answered a start/stop request with a non-`OK` status.
    #[error("Device didn't {action} the app: {reason}")]
    Rejected {
        /// `"start"` or `"stop"`
        action: &'static str,
        /// `reason` field of the response
        reason: String,
    },

    /// The data endpoint answered with a non-`OK` status.
    #[error("Could not fetch data from webapp: {0}")]
    NoData(String),
}

/// The companion acquisition application is unavailable.
///
/// Rendering this error produces the full operator-facing message, including
/// the hint that only acquisition is impaired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Could not connect to webapp @ {host}. Error message: {failure}\n\
     You need to have scope (Oscilloscope) webapp installed on your device.\n\
     Only input acquisition is affected, you can use all other functions anyway."
)]
pub struct ApplicationError {
    /// Host the application runs on
    pub host: String,
    /// Underlying failure
    pub failure: AppFailure,
}

impl ApplicationError {
    /// Wrap a failure observed against `host`.
    pub fn new(host: impl Into<String>, failure: AppFailure) -> Self {
        Self {
            host: host.into(),
            failure,
        }
    }
}

// =============================================================================
// Board Errors
// =============================================================================

/// Every error surfaced by the board device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// Board transport failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Companion application failure.
    #[error(transparent)]
    Application(#[from] ApplicationError),

    /// A scope or generator channel other than 1 or 2 was requested.
    #[error("Error: Scope channel should be 1 or 2")]
    InvalidChannel(i64),

    /// A written value does not fit the attribute.
    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue {
        /// Attribute or command argument name
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// No attribute with this name exists.
    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// No command with this name exists.
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// The attribute cannot be written.
    #[error("Attribute '{0}' is read-only")]
    ReadOnly(String),
}

impl BoardError {
    /// Shorthand for [`BoardError::InvalidValue`].
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
