//! Operating state and status message of the board device.
//!
//! [`DeviceStatus`] is the single cell holding the externally visible state.
//! The connection supervisor and the controllers write it; the operating
//! state machine derives the final answer from it. All writes go through
//! short `parking_lot` critical sections and never span an `.await`.

use crate::error::BoardError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally reported state of the whole device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingState {
    /// Device created, first connection not attempted yet
    Init,
    /// Connected and idle
    On,
    /// Connected and a generator channel or the acquisition is active
    Running,
    /// Connected, but the acquisition application is unavailable
    Standby,
    /// Board transport is broken
    Fault,
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperatingState::Init => "INIT",
            OperatingState::On => "ON",
            OperatingState::Running => "RUNNING",
            OperatingState::Standby => "STANDBY",
            OperatingState::Fault => "FAULT",
        };
        f.write_str(label)
    }
}

/// Snapshot of state and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Operating state
    pub state: OperatingState,
    /// Free-text status message, empty during normal operation
    pub message: String,
}

impl StatusReport {
    /// Status line as shown to operators.
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device is in {} state.\n{}", self.state, self.message)
    }
}

/// Shared, lock-guarded state and status message.
#[derive(Debug)]
pub struct DeviceStatus {
    inner: RwLock<StatusReport>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStatus {
    /// Fresh status in [`OperatingState::Init`] with an empty message.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StatusReport {
                state: OperatingState::Init,
                message: String::new(),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> OperatingState {
        self.inner.read().state
    }

    /// Current message.
    pub fn message(&self) -> String {
        self.inner.read().message.clone()
    }

    /// Copy of state and message.
    pub fn snapshot(&self) -> StatusReport {
        self.inner.read().clone()
    }

    /// Enter a state of normal operation and clear the message.
    ///
    /// Entering `RUNNING` while `FAULT` is in force is refused: running
    /// requires a healthy board connection. Returns whether the state was
    /// applied.
    pub fn set_ok(&self, state: OperatingState) -> bool {
        let mut inner = self.inner.write();
        if state == OperatingState::Running && inner.state == OperatingState::Fault {
            tracing::debug!("Ignoring RUNNING while board connection is in FAULT");
            return false;
        }
        inner.state = state;
        inner.message.clear();
        true
    }

    /// Change the state and keep the message.
    pub fn set_state(&self, state: OperatingState) -> bool {
        let mut inner = self.inner.write();
        if state == OperatingState::Running && inner.state == OperatingState::Fault {
            return false;
        }
        inner.state = state;
        true
    }

    /// Replace the message and keep the state.
    pub fn set_message(&self, message: impl Into<String>) {
        self.inner.write().message = message.into();
    }

    /// Clear the message and keep the state.
    pub fn clear_message(&self) {
        self.inner.write().message.clear();
    }

    /// Render an error into state and message.
    ///
    /// Connection errors move to `FAULT`. Application errors move to
    /// `STANDBY` unless `FAULT` is in force. An invalid channel only sets
    /// the message; caller mistakes on the attribute table leave the status
    /// untouched.
    pub fn report(&self, error: &BoardError) {
        let mut inner = self.inner.write();
        match error {
            BoardError::Connection(e) => {
                inner.state = OperatingState::Fault;
                inner.message = e.to_string();
            }
            // A lost board connection outranks a missing application
            BoardError::Application(_) if inner.state == OperatingState::Fault => {}
            BoardError::Application(e) => {
                inner.state = OperatingState::Standby;
                inner.message = e.to_string();
            }
            BoardError::InvalidChannel(_) => {
                inner.message = error.to_string();
            }
            BoardError::InvalidValue { .. }
            | BoardError::UnknownAttribute(_)
            | BoardError::UnknownCommand(_)
            | BoardError::ReadOnly(_) => {}
        }
    }
}
