//! Remote board handle abstraction.
//!
//! A [`RemoteBoard`] is a live session to the board's object graph:
//! housekeeping sensors, the LED register, both generator channels and the
//! scope sampling frequency. Handles are opened by a [`BoardConnector`] and
//! are replaced wholesale on reconnect; nothing keeps a handle across calls.

use crate::error::BoardError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Generator / scope channel of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Channel 1 (generator `asga`, scope dataset 0)
    One,
    /// Channel 2 (generator `asgb`, scope dataset 1)
    Two,
}

impl Channel {
    /// Both channels in order.
    pub const ALL: [Channel; 2] = [Channel::One, Channel::Two];

    /// 1-based channel number.
    pub fn number(self) -> u8 {
        match self {
            Channel::One => 1,
            Channel::Two => 2,
        }
    }

    /// 0-based index into per-channel arrays.
    pub fn index(self) -> usize {
        usize::from(self.number() - 1)
    }
}

impl TryFrom<i64> for Channel {
    type Error = BoardError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Channel::One),
            2 => Ok(Channel::Two),
            other => Err(BoardError::InvalidChannel(other)),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Supply rails monitored by the analog mixed-signal block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoltageRail {
    /// Processing system internal voltage
    Pint,
    /// Processing system auxiliary voltage
    Paux,
    /// RAM blocks voltage
    Bram,
    /// Programmable logic internal voltage
    Int,
    /// Programmable logic auxiliary voltage
    Aux,
    /// DDR I/O voltage
    Ddr,
}

impl VoltageRail {
    /// All six rails.
    pub const ALL: [VoltageRail; 6] = [
        VoltageRail::Pint,
        VoltageRail::Paux,
        VoltageRail::Bram,
        VoltageRail::Int,
        VoltageRail::Aux,
        VoltageRail::Ddr,
    ];

    /// Register name on the board (`vccpint`, `vccddr`, ...).
    pub fn register(self) -> &'static str {
        match self {
            VoltageRail::Pint => "vccpint",
            VoltageRail::Paux => "vccpaux",
            VoltageRail::Bram => "vccbram",
            VoltageRail::Int => "vccint",
            VoltageRail::Aux => "vccaux",
            VoltageRail::Ddr => "vccddr",
        }
    }
}

/// Live session to the board.
///
/// Every method is one remote round-trip. Errors are transport-level and
/// are classified as connection errors by the caller.
#[async_trait]
pub trait RemoteBoard: Send + Sync {
    /// Liveness check.
    async fn ping(&self) -> Result<()>;

    /// FPGA temperature in °C.
    async fn temperature(&self) -> Result<f64>;

    /// Voltage of one supply rail in V.
    async fn voltage(&self, rail: VoltageRail) -> Result<f64>;

    /// LED register.
    async fn leds(&self) -> Result<u8>;

    /// Write the LED register.
    async fn set_leds(&self, value: u8) -> Result<()>;

    /// Output-zero flag of a generator channel (`true` = inactive).
    async fn output_zero(&self, channel: Channel) -> Result<bool>;

    /// Write the output-zero flag of a generator channel.
    async fn set_output_zero(&self, channel: Channel, zero: bool) -> Result<()>;

    /// Scope sampling frequency in Hz.
    async fn scope_frequency(&self) -> Result<f64>;

    /// Write the scope sampling frequency.
    async fn set_scope_frequency(&self, hz: f64) -> Result<()>;

    /// Execute a shell-style command on the board host.
    async fn run_command(&self, command: &str) -> Result<()>;
}

/// Opens [`RemoteBoard`] sessions.
#[async_trait]
pub trait BoardConnector: Send + Sync {
    /// Open a new session to `host:port`.
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn RemoteBoard>>;
}
