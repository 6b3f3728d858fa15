//! Red Pitaya Board Driver
//!
//! This crate drives a Red Pitaya STEMlab board: housekeeping registers
//! (temperature, supply rails, LEDs), the two signal generator channels and
//! the oscilloscope acquisition application.
//!
//! # Communication
//!
//! - Registers and command execution: SCPI over TCP (default port 18861)
//! - Acquisition: HTTP requests to the board's scope web application
//!
//! # Operating State
//!
//! The reported state is derived on demand from live introspection:
//! connection failures give `FAULT`, a missing acquisition application gives
//! `STANDBY`, any generator output or running acquisition gives `RUNNING`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pitaya_driver::RedPitayaBoardFactory;
//!
//! let config = toml::toml! {
//!     host = "192.168.1.100"
//!     port = 18861
//!     reconnect = 10
//! };
//! let board = RedPitayaBoardFactory.build(config.into()).await?;
//! println!("{}", board.status().await);
//! ```
//!
//! # Mock Mode
//!
//! For testing without hardware, set `mock = true` in the configuration:
//!
//! ```rust,ignore
//! let config = toml::toml! {
//!     host = "192.168.1.100"
//!     mock = true
//! };
//! ```

pub mod acquisition;
mod driver;
pub mod generator;
pub mod mock;
pub mod scope;
mod scpi;
pub mod state_machine;
pub mod supervisor;

pub use acquisition::{AcquisitionAppClient, AcquisitionStatus, AppResponse, AppTransport, HttpTransport};
pub use driver::{RedPitayaBoard, RedPitayaBoardConfig, RedPitayaBoardFactory};
pub use generator::GeneratorController;
pub use scope::ScopeController;
pub use scpi::{ScpiBoard, ScpiClient, ScpiConnector};
pub use state_machine::OperatingStateMachine;
pub use supervisor::ConnectionSupervisor;
