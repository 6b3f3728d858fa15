//! # Pitaya Board
//!
//! Application layer of the Red Pitaya board session. The board logic lives
//! in the workspace crates; this crate adds what a running program needs
//! around it.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered configuration (defaults, TOML file, `PITAYA_`
//!   environment variables) loaded with `figment`. See `config::AppConfig`.
//! - **`logging`**: `tracing-subscriber` setup with selectable output format.
//!
//! The workspace crates are re-exported:
//!
//! - **`pitaya_core`**: board traits, operating state, typed errors.
//! - **`pitaya_driver`**: SCPI and HTTP transports, connection supervisor,
//!   state machine, scope and generator controllers, mock board.

pub mod config;
pub mod logging;

pub use pitaya_core;
pub use pitaya_driver;

pub use config::{AppConfig, ConfigError};
pub use pitaya_driver::{RedPitayaBoard, RedPitayaBoardConfig, RedPitayaBoardFactory};
