//! Red Pitaya board device
//!
//! Wires the supervisor, the state machine and both controllers around one
//! shared status cell, and exposes them as named attributes and commands.
//!
//! # Attributes
//!
//! - `temperature` (read-only) - FPGA temperature in °C
//! - `leds` - LED register, 0..=255
//! - `ping` (read-only) - `"OK"` or `"FAILED"`; drives reconnects
//! - `scope_active` - acquisition running; writing starts/stops it
//! - `scope_frequency` - sampling frequency in Hz
//! - `generator_ch1_active`, `generator_ch2_active` (read-only)
//! - `pint_voltage`, `paux_voltage`, `bram_voltage`, `int_voltage`,
//!   `aux_voltage`, `ddr_voltage` (read-only) - supply rails in V
//! - `state`, `status` (read-only)
//!
//! # Commands
//!
//! `scope_data`, `start_scope`, `stop_scope`, `start_generator_ch1`,
//! `start_generator_ch2`, `stop_generator_ch1`, `stop_generator_ch2`,
//! `connect`.

use crate::acquisition::{AcquisitionAppClient, DEFAULT_HTTP_TIMEOUT_MS};
use crate::generator::GeneratorController;
use crate::mock::{MockAppTransport, MockBoard, MockConnector};
use crate::scope::ScopeController;
use crate::scpi::ScpiConnector;
use crate::state_machine::OperatingStateMachine;
use crate::supervisor::ConnectionSupervisor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use pitaya_core::board::{BoardConnector, Channel, VoltageRail};
use pitaya_core::capabilities::{AttributeAccess, AttributeInfo, CommandInfo, Commandable};
use pitaya_core::config::ConnectionConfig;
use pitaya_core::error::{BoardError, BoardResult};
use pitaya_core::state::{DeviceStatus, OperatingState, StatusReport};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Red Pitaya board device
#[derive(Debug, Clone, Deserialize)]
pub struct RedPitayaBoardConfig {
    /// Host, port and retry budget
    #[serde(flatten)]
    pub connection: ConnectionConfig,

    /// Enable mock mode for testing without hardware
    #[serde(default)]
    pub mock: bool,

    /// Timeout of acquisition application requests in ms
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_http_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

impl RedPitayaBoardConfig {
    /// Configuration for `connection` with default options.
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            mock: false,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}

// =============================================================================
// Exposed names
// =============================================================================

static ATTRIBUTES: &[AttributeInfo] = &[
    AttributeInfo::read_only("temperature", "FPGA Temperature", Some("°C"), "Temperature of the FPGA chip"),
    AttributeInfo::read_write("leds", "LEDs state", None, "State of the LED indicators (0-255)"),
    AttributeInfo::read_only("ping", "Ping check", None, "Connection ping check"),
    AttributeInfo::read_write("scope_active", "Scope active", None, "Oscilloscope operation state"),
    AttributeInfo::read_write("scope_frequency", "Scope frequency", Some("Hz"), "Oscilloscope sampling frequency"),
    AttributeInfo::read_only("generator_ch1_active", "Generator CH1 active", None, "CH1 generator operation state"),
    AttributeInfo::read_only("generator_ch2_active", "Generator CH2 active", None, "CH2 generator operation state"),
    AttributeInfo::read_only("pint_voltage", "PINT Voltage", Some("V"), "Processing system internal voltage"),
    AttributeInfo::read_only("paux_voltage", "PAUX Voltage", Some("V"), "Processing system auxiliary voltage"),
    AttributeInfo::read_only("bram_voltage", "BRAM Voltage", Some("V"), "RAM blocks voltage"),
    AttributeInfo::read_only("int_voltage", "INT Voltage", Some("V"), "Programmable logic internal voltage"),
    AttributeInfo::read_only("aux_voltage", "AUX Voltage", Some("V"), "Programmable logic auxiliary voltage"),
    AttributeInfo::read_only("ddr_voltage", "DDR Voltage", Some("V"), "DDR I/O voltage"),
    AttributeInfo::read_only("state", "State", None, "Operating state"),
    AttributeInfo::read_only("status", "Status", None, "Operating state and status message"),
];

static COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "scope_data",
        argument: Some("channel number (1 or 2)"),
        description: "Scope input samples of one channel",
    },
    CommandInfo {
        name: "start_scope",
        argument: None,
        description: "Start the acquisition application",
    },
    CommandInfo {
        name: "stop_scope",
        argument: None,
        description: "Stop the acquisition application",
    },
    CommandInfo {
        name: "start_generator_ch1",
        argument: Some("Vpp amplitude, frequency [Hz], type (sine, sqr, tri)"),
        description: "Start signal generator on channel 1",
    },
    CommandInfo {
        name: "start_generator_ch2",
        argument: Some("Vpp amplitude, frequency [Hz], type (sine, sqr, tri)"),
        description: "Start signal generator on channel 2",
    },
    CommandInfo {
        name: "stop_generator_ch1",
        argument: None,
        description: "Zero the output of channel 1",
    },
    CommandInfo {
        name: "stop_generator_ch2",
        argument: None,
        description: "Zero the output of channel 2",
    },
    CommandInfo {
        name: "connect",
        argument: None,
        description: "Reconnect to the board and reset the retry counter",
    },
];

fn voltage_rail(attribute: &str) -> Option<VoltageRail> {
    let rail = match attribute {
        "pint_voltage" => VoltageRail::Pint,
        "paux_voltage" => VoltageRail::Paux,
        "bram_voltage" => VoltageRail::Bram,
        "int_voltage" => VoltageRail::Int,
        "aux_voltage" => VoltageRail::Aux,
        "ddr_voltage" => VoltageRail::Ddr,
        _ => return None,
    };
    Some(rail)
}

// =============================================================================
// RedPitayaBoard
// =============================================================================

/// Red Pitaya board device.
///
/// # Example
///
/// ```rust,ignore
/// let board = RedPitayaBoard::new_async(&config).await;
///
/// // Health check, reconnecting if needed
/// assert_eq!(board.ping().await, "OK");
///
/// // Start a 1 Vpp, 1 kHz sine on channel 1
/// board.start_generator(Channel::One, "1 1000 sine").await?;
/// assert_eq!(board.state().await, OperatingState::Running);
/// ```
pub struct RedPitayaBoard {
    status: Arc<DeviceStatus>,
    supervisor: Arc<ConnectionSupervisor>,
    state_machine: OperatingStateMachine,
    scope: ScopeController,
    generator: GeneratorController,
}

impl RedPitayaBoard {
    /// Initialize the device and attempt the first connection.
    ///
    /// Never fails: a refused connection leaves the device in `FAULT` with
    /// the reason in the status message.
    pub async fn init(
        config: ConnectionConfig,
        connector: Arc<dyn BoardConnector>,
        app: AcquisitionAppClient,
    ) -> Arc<Self> {
        let status = Arc::new(DeviceStatus::new());
        status.set_ok(OperatingState::Init);

        let app = Arc::new(app);
        let supervisor = Arc::new(ConnectionSupervisor::new(
            config,
            connector,
            status.clone(),
        ));

        let board = Arc::new(Self {
            state_machine: OperatingStateMachine::new(
                supervisor.clone(),
                app.clone(),
                status.clone(),
            ),
            scope: ScopeController::new(app, status.clone()),
            generator: GeneratorController::new(supervisor.clone(), status.clone()),
            supervisor,
            status,
        });

        if board.supervisor.connect().await.is_err() {
            tracing::warn!("Initial board connection failed; device is in FAULT");
        }
        board
    }

    /// Initialize from configuration, over SCPI/HTTP or mocks.
    pub async fn new_async(config: &RedPitayaBoardConfig) -> Arc<Self> {
        let connection = config.connection.clone();
        if config.mock {
            tracing::info!("Creating mock Red Pitaya board");
            let connector = Arc::new(MockConnector::new(Arc::new(MockBoard::new())));
            let app = AcquisitionAppClient::new(
                connection.host.clone(),
                Arc::new(MockAppTransport::simulated()),
            );
            Self::init(connection, connector, app).await
        } else {
            tracing::info!(
                "Creating Red Pitaya board at {}:{}",
                connection.host,
                connection.port
            );
            let app = AcquisitionAppClient::http(
                connection.host.clone(),
                Duration::from_millis(config.http_timeout_ms),
            );
            Self::init(connection, Arc::new(ScpiConnector), app).await
        }
    }

    /// Shared status cell.
    pub fn device_status(&self) -> &Arc<DeviceStatus> {
        &self.status
    }

    /// Connection supervisor.
    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    /// Operating state machine.
    pub fn state_machine(&self) -> &OperatingStateMachine {
        &self.state_machine
    }

    /// Scope controller.
    pub fn scope(&self) -> &ScopeController {
        &self.scope
    }

    /// Generator controller.
    pub fn generator(&self) -> &GeneratorController {
        &self.generator
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Derived operating state.
    pub async fn state(&self) -> OperatingState {
        self.state_machine.derive_state().await.state
    }

    /// Derived state and message.
    pub async fn report(&self) -> StatusReport {
        self.state_machine.derive_state().await
    }

    /// Operator-facing status line.
    pub async fn status(&self) -> String {
        self.state_machine.status_text().await
    }

    /// Explicit reconnect, also after the retry budget is spent.
    pub async fn connect(&self) -> BoardResult<()> {
        Ok(self.supervisor.connect().await?)
    }

    /// Health check: `"OK"` or `"FAILED"`.
    pub async fn ping(&self) -> &'static str {
        match self.supervisor.check_health().await {
            Ok(()) => "OK",
            Err(_) => "FAILED",
        }
    }

    // =========================================================================
    // Registers
    // =========================================================================

    /// FPGA temperature in °C.
    pub async fn temperature(&self) -> BoardResult<f64> {
        Ok(self
            .supervisor
            .with_board(|board| async move { board.temperature().await })
            .await?)
    }

    /// Voltage of one supply rail in V.
    pub async fn voltage(&self, rail: VoltageRail) -> BoardResult<f64> {
        Ok(self
            .supervisor
            .with_board(|board| async move { board.voltage(rail).await })
            .await?)
    }

    /// LED register.
    pub async fn leds(&self) -> BoardResult<u8> {
        Ok(self
            .supervisor
            .with_board(|board| async move { board.leds().await })
            .await?)
    }

    /// Write the LED register.
    pub async fn set_leds(&self, value: u8) -> BoardResult<()> {
        Ok(self
            .supervisor
            .with_board(|board| async move { board.set_leds(value).await })
            .await?)
    }

    /// Scope sampling frequency in Hz.
    pub async fn scope_frequency(&self) -> BoardResult<f64> {
        Ok(self
            .supervisor
            .with_board(|board| async move { board.scope_frequency().await })
            .await?)
    }

    /// Write the scope sampling frequency.
    pub async fn set_scope_frequency(&self, hz: f64) -> BoardResult<()> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(BoardError::invalid_value(
                "scope_frequency",
                "must be a positive number",
            ));
        }
        Ok(self
            .supervisor
            .with_board(|board| async move { board.set_scope_frequency(hz).await })
            .await?)
    }

    // =========================================================================
    // Scope and generator
    // =========================================================================

    /// Whether acquisition is running.
    pub async fn scope_active(&self) -> bool {
        self.scope.is_active().await
    }

    /// Start (`true`) or stop (`false`) acquisition.
    pub async fn set_scope_active(&self, active: bool) -> BoardResult<()> {
        if active {
            self.scope.start().await?;
        } else {
            self.scope.stop().await?;
        }
        Ok(())
    }

    /// Scope samples of `channel`; see [`ScopeController::read_waveform`].
    pub async fn scope_data(&self, channel: i64) -> Option<Vec<f64>> {
        self.scope.read_waveform(channel).await
    }

    /// Whether a generator channel is producing output.
    pub async fn generator_active(&self, channel: Channel) -> BoardResult<bool> {
        Ok(self.generator.is_active(channel).await?)
    }

    /// Start a generator channel.
    pub async fn start_generator(&self, channel: Channel, args: &str) -> BoardResult<()> {
        Ok(self.generator.start(channel, args).await?)
    }

    /// Zero a generator channel.
    pub async fn stop_generator(&self, channel: Channel) -> BoardResult<()> {
        Ok(self.generator.stop(channel).await?)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

#[async_trait]
impl AttributeAccess for RedPitayaBoard {
    fn attributes(&self) -> &'static [AttributeInfo] {
        ATTRIBUTES
    }

    async fn read_attribute(&self, name: &str) -> BoardResult<Value> {
        if let Some(rail) = voltage_rail(name) {
            return Ok(json!(self.voltage(rail).await?));
        }

        let value = match name {
            "temperature" => json!(self.temperature().await?),
            "leds" => json!(self.leds().await?),
            "ping" => json!(self.ping().await),
            "scope_active" => json!(self.scope_active().await),
            "scope_frequency" => json!(self.scope_frequency().await?),
            "generator_ch1_active" => json!(self.generator_active(Channel::One).await?),
            "generator_ch2_active" => json!(self.generator_active(Channel::Two).await?),
            "state" => json!(self.state().await.to_string()),
            "status" => json!(self.status().await),
            other => return Err(BoardError::UnknownAttribute(other.to_string())),
        };
        Ok(value)
    }

    async fn write_attribute(&self, name: &str, value: Value) -> BoardResult<()> {
        match name {
            "leds" => {
                let leds = value
                    .as_u64()
                    .and_then(|v| u8::try_from(v).ok())
                    .ok_or_else(|| BoardError::invalid_value("leds", "expected an integer 0-255"))?;
                self.set_leds(leds).await
            }
            "scope_frequency" => {
                let hz = value
                    .as_f64()
                    .ok_or_else(|| BoardError::invalid_value("scope_frequency", "expected a number"))?;
                self.set_scope_frequency(hz).await
            }
            "scope_active" => {
                let active = value
                    .as_bool()
                    .ok_or_else(|| BoardError::invalid_value("scope_active", "expected a boolean"))?;
                self.set_scope_active(active).await
            }
            other if ATTRIBUTES.iter().any(|a| a.name == other) => {
                Err(BoardError::ReadOnly(other.to_string()))
            }
            other => Err(BoardError::UnknownAttribute(other.to_string())),
        }
    }
}

/// Channel argument of `scope_data`: a bare number or `{"channel": n}`.
fn channel_arg(args: &Value) -> BoardResult<i64> {
    args.as_i64()
        .or_else(|| args.get("channel").and_then(Value::as_i64))
        .ok_or_else(|| BoardError::invalid_value("channel", "expected an integer"))
}

/// Parameter argument of `start_generator_*`: a string or `{"args": "..."}`.
fn generator_arg(args: &Value) -> BoardResult<String> {
    args.as_str()
        .or_else(|| args.get("args").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| BoardError::invalid_value("args", "expected a parameter string"))
}

#[async_trait]
impl Commandable for RedPitayaBoard {
    fn commands(&self) -> &'static [CommandInfo] {
        COMMANDS
    }

    async fn execute_command(&self, command: &str, args: Value) -> BoardResult<Value> {
        match command {
            "scope_data" => {
                let channel = channel_arg(&args)?;
                Ok(json!(self.scope_data(channel).await))
            }
            "start_scope" => self.set_scope_active(true).await.map(|_| Value::Null),
            "stop_scope" => self.set_scope_active(false).await.map(|_| Value::Null),
            "start_generator_ch1" => {
                let params = generator_arg(&args)?;
                self.start_generator(Channel::One, &params).await?;
                Ok(Value::Null)
            }
            "start_generator_ch2" => {
                let params = generator_arg(&args)?;
                self.start_generator(Channel::Two, &params).await?;
                Ok(Value::Null)
            }
            "stop_generator_ch1" => self.stop_generator(Channel::One).await.map(|_| Value::Null),
            "stop_generator_ch2" => self.stop_generator(Channel::Two).await.map(|_| Value::Null),
            "connect" => self.connect().await.map(|_| Value::Null),
            other => Err(BoardError::UnknownCommand(other.to_string())),
        }
    }
}

// =============================================================================
// RedPitayaBoardFactory
// =============================================================================

/// Factory building [`RedPitayaBoard`] devices from TOML configuration.
pub struct RedPitayaBoardFactory;

impl RedPitayaBoardFactory {
    /// Driver type key in configuration files.
    pub fn driver_type(&self) -> &'static str {
        "red_pitaya_board"
    }

    /// Human-readable driver name.
    pub fn name(&self) -> &'static str {
        "Red Pitaya Board"
    }

    /// Check a configuration table without connecting.
    pub fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: RedPitayaBoardConfig = config
            .clone()
            .try_into()
            .context("Invalid Red Pitaya board config")?;

        cfg.connection.validate()?;

        if cfg.http_timeout_ms == 0 {
            anyhow::bail!("'http_timeout_ms' field cannot be 0");
        }

        Ok(())
    }

    /// Build and initialize a device from a configuration table.
    pub fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<Arc<RedPitayaBoard>>> {
        Box::pin(async move {
            let cfg: RedPitayaBoardConfig =
                config.try_into().context("Invalid Red Pitaya board config")?;
            cfg.connection.validate()?;
            Ok(RedPitayaBoard::new_async(&cfg).await)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
