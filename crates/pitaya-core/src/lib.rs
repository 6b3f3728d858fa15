//! Core types and traits for the Red Pitaya board session.
//!
//! - [`board`]: the remote board handle and its connector
//! - [`state`]: operating state and status message
//! - [`error`]: connection / application error classification
//! - [`config`]: connection settings
//! - [`capabilities`]: attribute and command dispatch surface

pub mod board;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod state;

pub use board::{BoardConnector, Channel, RemoteBoard, VoltageRail};
pub use capabilities::{AttributeAccess, AttributeInfo, CommandInfo, Commandable};
pub use config::ConnectionConfig;
pub use error::{
    AppFailure, ApplicationError, BoardError, BoardResult, ConnectionError,
};
pub use state::{DeviceStatus, OperatingState, StatusReport};
