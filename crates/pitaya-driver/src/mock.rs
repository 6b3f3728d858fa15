//! In-memory board and application doubles
//!
//! Used by mock mode (`mock = true`) and by tests. Both doubles can be
//! switched offline to exercise the failure paths.

use crate::acquisition::{AppTransport, DATA_PATH, START_PATH, STOP_PATH};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use pitaya_core::board::{BoardConnector, Channel, RemoteBoard, VoltageRail};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// MockBoard
// =============================================================================

#[derive(Debug, Clone)]
struct BoardRegisters {
    temperature: f64,
    voltages: HashMap<VoltageRail, f64>,
    leds: u8,
    output_zero: [bool; 2],
    scope_frequency: f64,
}

impl Default for BoardRegisters {
    fn default() -> Self {
        let voltages = [
            (VoltageRail::Pint, 1.0),
            (VoltageRail::Paux, 1.8),
            (VoltageRail::Bram, 1.0),
            (VoltageRail::Int, 1.0),
            (VoltageRail::Aux, 1.8),
            (VoltageRail::Ddr, 1.5),
        ]
        .into_iter()
        .collect();

        Self {
            temperature: 48.5,
            voltages,
            leds: 0,
            output_zero: [true, true],
            scope_frequency: 125e6,
        }
    }
}

/// Simulated board.
///
/// Running `/opt/bin/generate <n> ...` clears the output-zero flag of
/// channel `n`, like the real generator binary does.
pub struct MockBoard {
    registers: Mutex<BoardRegisters>,
    commands: Mutex<Vec<String>>,
    link_up: AtomicBool,
    pings: AtomicUsize,
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBoard {
    /// Board with idle generators and nominal sensor values.
    pub fn new() -> Self {
        Self {
            registers: Mutex::new(BoardRegisters::default()),
            commands: Mutex::new(Vec::new()),
            link_up: AtomicBool::new(true),
            pings: AtomicUsize::new(0),
        }
    }

    /// Make every call fail (`false`) or succeed again (`true`).
    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::SeqCst);
    }

    /// Force a generator channel active or idle.
    pub fn set_channel_active(&self, channel: Channel, active: bool) {
        self.registers.lock().output_zero[channel.index()] = !active;
    }

    /// Commands passed to `run_command` so far.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Number of ping calls received.
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn check_link(&self) -> Result<()> {
        if !self.link_up.load(Ordering::SeqCst) {
            anyhow::bail!("Connection closed by board");
        }
        Ok(())
    }

    fn parse_generate(command: &str) -> Option<Channel> {
        let mut parts = command.split_whitespace();
        if parts.next()? != "/opt/bin/generate" {
            return None;
        }
        parts.next()?.parse::<i64>().ok()?.try_into().ok()
    }
}

#[async_trait]
impl RemoteBoard for MockBoard {
    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check_link()
    }

    async fn temperature(&self) -> Result<f64> {
        self.check_link()?;
        Ok(self.registers.lock().temperature)
    }

    async fn voltage(&self, rail: VoltageRail) -> Result<f64> {
        self.check_link()?;
        Ok(self
            .registers
            .lock()
            .voltages
            .get(&rail)
            .copied()
            .unwrap_or_default())
    }

    async fn leds(&self) -> Result<u8> {
        self.check_link()?;
        Ok(self.registers.lock().leds)
    }

    async fn set_leds(&self, value: u8) -> Result<()> {
        self.check_link()?;
        self.registers.lock().leds = value;
        Ok(())
    }

    async fn output_zero(&self, channel: Channel) -> Result<bool> {
        self.check_link()?;
        Ok(self.registers.lock().output_zero[channel.index()])
    }

    async fn set_output_zero(&self, channel: Channel, zero: bool) -> Result<()> {
        self.check_link()?;
        self.registers.lock().output_zero[channel.index()] = zero;
        Ok(())
    }

    async fn scope_frequency(&self) -> Result<f64> {
        self.check_link()?;
        Ok(self.registers.lock().scope_frequency)
    }

    async fn set_scope_frequency(&self, hz: f64) -> Result<()> {
        self.check_link()?;
        self.registers.lock().scope_frequency = hz;
        Ok(())
    }

    async fn run_command(&self, command: &str) -> Result<()> {
        self.check_link()?;
        tracing::debug!("Mock board command: {}", command);
        self.commands.lock().push(command.to_string());
        if let Some(channel) = Self::parse_generate(command) {
            self.registers.lock().output_zero[channel.index()] = false;
        }
        Ok(())
    }
}

/// Hands out one shared [`MockBoard`].
pub struct MockConnector {
    board: Arc<MockBoard>,
    accepting: AtomicBool,
    attempts: AtomicUsize,
}

impl MockConnector {
    /// Connector over `board`, accepting connections.
    pub fn new(board: Arc<MockBoard>) -> Self {
        Self {
            board,
            accepting: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
        }
    }

    /// The simulated board.
    pub fn board(&self) -> &Arc<MockBoard> {
        &self.board
    }

    /// Accept (`true`) or refuse (`false`) new connections.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Take board and connector offline or back online together.
    pub fn set_online(&self, online: bool) {
        self.set_accepting(online);
        self.board.set_link_up(online);
    }

    /// Number of connect calls received.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BoardConnector for MockConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn RemoteBoard>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.accepting.load(Ordering::SeqCst) {
            anyhow::bail!("Connection refused ({}:{})", host, port);
        }
        tracing::info!(host, port, "Connected to mock board");
        Ok(self.board.clone())
    }
}

// =============================================================================
// MockAppTransport
// =============================================================================

/// Scripted acquisition application.
///
/// Responses are set per path. In simulated mode, a successful start makes
/// `/data` return a sampled sine on channel 1 and a stop unloads it again.
pub struct MockAppTransport {
    responses: Mutex<HashMap<String, std::result::Result<String, String>>>,
    requests: Mutex<Vec<String>>,
    simulated: bool,
}

impl Default for MockAppTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAppTransport {
    /// Transport with no scripted responses.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            simulated: false,
        }
    }

    /// Transport behaving like an installed but stopped scope application.
    pub fn simulated() -> Self {
        let transport = Self {
            simulated: true,
            ..Self::new()
        };
        transport.respond(START_PATH, r#"{"status":"OK"}"#);
        transport.respond(STOP_PATH, r#"{"status":"OK"}"#);
        transport.respond(DATA_PATH, not_loaded_body());
        transport
    }

    /// Answer `path` with `body`.
    pub fn respond(&self, path: &str, body: impl Into<String>) {
        self.responses
            .lock()
            .insert(path.to_string(), Ok(body.into()));
    }

    /// Fail requests to `path` with `message`.
    pub fn fail(&self, path: &str, message: impl Into<String>) {
        self.responses
            .lock()
            .insert(path.to_string(), Err(message.into()));
    }

    /// Paths requested so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

fn not_loaded_body() -> String {
    serde_json::json!({"status": "ERR", "reason": "Application not loaded"}).to_string()
}

fn sine_body(samples: usize) -> String {
    let points: Vec<[f64; 2]> = (0..samples)
        .map(|i| {
            let t = i as f64;
            [t, (t * std::f64::consts::TAU / samples as f64).sin()]
        })
        .collect();
    serde_json::json!({
        "status": "OK",
        "datasets": {"g1": [{"data": points}, {"data": []}]}
    })
    .to_string()
}

#[async_trait]
impl AppTransport for MockAppTransport {
    async fn get(&self, path: &str) -> Result<String> {
        tracing::debug!("Mock app request: {}", path);
        self.requests.lock().push(path.to_string());

        let reply = self.responses.lock().get(path).cloned();
        let body = match reply {
            Some(Ok(body)) => body,
            Some(Err(message)) => anyhow::bail!("{}", message),
            None => anyhow::bail!("No mock response for {}", path),
        };

        if self.simulated {
            match path {
                START_PATH => self.respond(DATA_PATH, sine_body(64)),
                STOP_PATH => self.respond(DATA_PATH, not_loaded_body()),
                _ => {}
            }
        }
        Ok(body)
    }
}
