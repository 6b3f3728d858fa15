//! SCPI over TCP transport for the board handle
//!
//! [`ScpiClient`] is a line-oriented command/query client; [`ScpiBoard`]
//! maps the [`RemoteBoard`] operations onto its command set and
//! [`ScpiConnector`] opens one client per connect.
//!
//! # Command set
//!
//! The mapping below is this project's own wire convention, served by the
//! board-side agent listening on [`DEFAULT_PORT`](pitaya_core::config::DEFAULT_PORT).
//! It is not the vendor's SCPI server: `*IDN?` and the `AMS:` queries follow
//! its naming, while `HK:LED`, `ASG<n>:OZERO`, `SCOPE:FREQ` and `SYST:RUN`
//! exist only here.
//!
//! | Operation | Line |
//! |---|---|
//! | ping | `*IDN?` |
//! | temperature / voltage | `AMS:TEMP?`, `AMS:VCC<RAIL>?` |
//! | LED register | `HK:LED?`, `HK:LED <n>` |
//! | generator output zero | `ASG<n>:OZERO?`, `ASG<n>:OZERO ON\|OFF` |
//! | scope sampling frequency | `SCOPE:FREQ?`, `SCOPE:FREQ <hz>` |
//! | shell command | `SYST:RUN "<command>"` |
//!
//! A query that times out leaves its reply in flight, so the client refuses
//! further traffic after one; the supervisor then replaces the session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pitaya_core::board::{BoardConnector, Channel, RemoteBoard, VoltageRail};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default TCP connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default reply timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Async SCPI client for TCP communication with the board
pub struct ScpiClient {
    stream: Mutex<BufReader<TcpStream>>,
    timeout: Duration,
    desynced: AtomicBool,
}

impl ScpiClient {
    /// Connect to `host:port`; hostnames are resolved.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = timeout(
            Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            TcpStream::connect((host, port)),
        )
        .await
        .with_context(|| format!("Connection timeout to {}:{}", host, port))?
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        tracing::info!(host, port, "Connected to board");

        Ok(Self {
            stream: Mutex::new(BufReader::new(stream)),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            desynced: AtomicBool::new(false),
        })
    }

    /// Set the reply timeout.
    pub fn set_timeout(&mut self, duration: Duration) {
        self.timeout = duration;
    }

    /// Send a command without expecting a response.
    pub async fn write(&self, command: &str) -> Result<()> {
        let mut stream = self.stream.lock().await;
        self.check_sync()?;
        tracing::debug!("SCPI write: {:?}", command);
        Self::send_line(&mut stream, command).await
    }

    /// Send a query and read one line of response.
    pub async fn query(&self, query: &str) -> Result<String> {
        let mut stream = self.stream.lock().await;
        self.check_sync()?;
        Self::discard_pending(&mut stream).await;

        tracing::debug!("SCPI query: {:?}", query);
        Self::send_line(&mut stream, query).await?;

        let mut response = String::new();
        match timeout(self.timeout, stream.read_line(&mut response)).await {
            Ok(Ok(0)) => anyhow::bail!("Connection closed by board"),
            Ok(Ok(_)) => {
                let trimmed = response.trim().to_string();
                tracing::debug!("SCPI response: {:?}", trimmed);
                Ok(trimmed)
            }
            Ok(Err(e)) => Err(e).context("Failed to read response"),
            Err(_) => {
                self.desynced.store(true, Ordering::SeqCst);
                anyhow::bail!("Timeout waiting for response to: {}", query)
            }
        }
    }

    /// Whether a timed-out query left the session unusable.
    pub fn is_desynced(&self) -> bool {
        self.desynced.load(Ordering::SeqCst)
    }

    fn check_sync(&self) -> Result<()> {
        if self.is_desynced() {
            anyhow::bail!("SCPI session out of sync after a reply timeout");
        }
        Ok(())
    }

    /// Drop unsolicited bytes, buffered or still on the socket.
    async fn discard_pending(stream: &mut BufReader<TcpStream>) {
        let buffered = stream.buffer().len();
        if buffered > 0 {
            tracing::debug!("Discarding {} buffered bytes", buffered);
            stream.consume(buffered);
        }

        let mut scratch = [0u8; 256];
        loop {
            let peeked =
                timeout(Duration::from_millis(10), stream.get_mut().peek(&mut scratch)).await;
            let pending = match peeked {
                Ok(Ok(n)) if n > 0 => n,
                _ => break,
            };
            match stream.get_mut().try_read(&mut scratch[..pending]) {
                Ok(read) if read > 0 => tracing::debug!("Discarding {} stale bytes", read),
                _ => break,
            }
        }
    }

    /// Query a floating-point value.
    pub async fn query_f64(&self, query: &str) -> Result<f64> {
        let response = self.query(query).await?;
        response.parse::<f64>().with_context(|| {
            format!(
                "Failed to parse '{}' as f64 from query: {}",
                response, query
            )
        })
    }

    /// Query a boolean value (ON/OFF or 1/0).
    pub async fn query_bool(&self, query: &str) -> Result<bool> {
        let response = self.query(query).await?;
        parse_bool(&response)
            .with_context(|| format!("Failed to parse '{}' as boolean from query: {}", response, query))
    }

    async fn send_line(stream: &mut BufReader<TcpStream>, line: &str) -> Result<()> {
        let cmd = format!("{}\r\n", line);
        stream
            .get_mut()
            .write_all(cmd.as_bytes())
            .await
            .with_context(|| format!("Failed to write: {}", line))?;
        stream
            .get_mut()
            .flush()
            .await
            .context("Failed to flush stream")
    }
}

/// Parse an SCPI boolean reply.
pub(crate) fn parse_bool(response: &str) -> Result<bool> {
    match response.trim().to_uppercase().as_str() {
        "ON" | "1" | "TRUE" => Ok(true),
        "OFF" | "0" | "FALSE" => Ok(false),
        other => anyhow::bail!("not a boolean: '{}'", other),
    }
}

/// SCPI command for the register backing a voltage rail.
pub(crate) fn voltage_query(rail: VoltageRail) -> String {
    format!("AMS:{}?", rail.register().to_uppercase())
}

/// SCPI command running `command` on the board host.
pub(crate) fn run_command_line(command: &str) -> String {
    format!("SYST:RUN \"{}\"", command.replace('\\', "\\\\").replace('"', "\\\""))
}

// =============================================================================
// ScpiBoard
// =============================================================================

/// [`RemoteBoard`] over an SCPI session.
pub struct ScpiBoard {
    client: ScpiClient,
}

impl ScpiBoard {
    /// Wrap a connected client.
    pub fn new(client: ScpiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteBoard for ScpiBoard {
    async fn ping(&self) -> Result<()> {
        let idn = self.client.query("*IDN?").await?;
        if idn.is_empty() {
            anyhow::bail!("Empty identification reply");
        }
        Ok(())
    }

    async fn temperature(&self) -> Result<f64> {
        self.client.query_f64("AMS:TEMP?").await
    }

    async fn voltage(&self, rail: VoltageRail) -> Result<f64> {
        self.client.query_f64(&voltage_query(rail)).await
    }

    async fn leds(&self) -> Result<u8> {
        let response = self.client.query("HK:LED?").await?;
        response
            .parse::<u8>()
            .with_context(|| format!("Failed to parse '{}' as LED register", response))
    }

    async fn set_leds(&self, value: u8) -> Result<()> {
        self.client.write(&format!("HK:LED {}", value)).await
    }

    async fn output_zero(&self, channel: Channel) -> Result<bool> {
        self.client
            .query_bool(&format!("ASG{}:OZERO?", channel.number()))
            .await
    }

    async fn set_output_zero(&self, channel: Channel, zero: bool) -> Result<()> {
        let flag = if zero { "ON" } else { "OFF" };
        self.client
            .write(&format!("ASG{}:OZERO {}", channel.number(), flag))
            .await
    }

    async fn scope_frequency(&self) -> Result<f64> {
        self.client.query_f64("SCOPE:FREQ?").await
    }

    async fn set_scope_frequency(&self, hz: f64) -> Result<()> {
        self.client.write(&format!("SCOPE:FREQ {}", hz)).await
    }

    async fn run_command(&self, command: &str) -> Result<()> {
        self.client.write(&run_command_line(command)).await
    }
}

/// Opens [`ScpiBoard`] sessions over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScpiConnector;

#[async_trait]
impl BoardConnector for ScpiConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn RemoteBoard>> {
        let client = ScpiClient::connect(host, port).await?;
        Ok(Arc::new(ScpiBoard::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("ON").unwrap());
        assert!(parse_bool("1\r\n").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_command_lines() {
        assert_eq!(voltage_query(VoltageRail::Pint), "AMS:VCCPINT?");
        assert_eq!(voltage_query(VoltageRail::Ddr), "AMS:VCCDDR?");
        assert_eq!(
            run_command_line(r#"/opt/bin/generate 1 "1 1000 sine""#),
            r#"SYST:RUN "/opt/bin/generate 1 \"1 1000 sine\"""#
        );
    }

    #[tokio::test]
    async fn test_board_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = String::new();
            let mut buf = [0u8; 256];
            // *IDN?, AMS:TEMP?, ASG2:OZERO?
            for reply in ["Red Pitaya,STEMlab,0,1.0\r\n", "51.25\r\n", "OFF\r\n"] {
                let n = socket.read(&mut buf).await.unwrap();
                seen.push_str(std::str::from_utf8(&buf[..n]).unwrap());
                socket.write_all(reply.as_bytes()).await.unwrap();
            }
            seen
        });

        let board = ScpiConnector.connect("127.0.0.1", port).await.unwrap();
        board.ping().await.unwrap();
        assert!((board.temperature().await.unwrap() - 51.25).abs() < 1e-9);
        assert!(!board.output_zero(Channel::Two).await.unwrap());

        let seen = server.await.unwrap();
        assert_eq!(seen, "*IDN?\r\nAMS:TEMP?\r\nASG2:OZERO?\r\n");
    }

    #[tokio::test]
    async fn test_late_reply_is_not_taken_for_the_next() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut first = true;
            while let Ok(Some(line)) = lines.next_line().await {
                if first {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    first = false;
                }
                let reply = format!("reply-to-{}\r\n", line);
                let _ = write.write_all(reply.as_bytes()).await;
            }
        });

        let mut client = ScpiClient::connect("127.0.0.1", port).await.unwrap();
        client.set_timeout(Duration::from_millis(100));

        let err = client.query("*IDN?").await.unwrap_err();
        assert!(err.to_string().contains("Timeout"));
        assert!(client.is_desynced());

        // Give the late reply time to arrive
        tokio::time::sleep(Duration::from_millis(400)).await;
        let err = client.query("AMS:TEMP?").await.unwrap_err();
        assert!(err.to_string().contains("out of sync"));
        assert!(client.write("HK:LED 3").await.is_err());
    }

    #[tokio::test]
    async fn test_unsolicited_bytes_are_discarded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"garbage\r\n").await.unwrap();
            let mut buf = [0u8; 64];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"48.0\r\n").await.unwrap();
            // Hold the socket open until the client is done
            let _ = socket.read(&mut buf).await;
        });

        let client = ScpiClient::connect("127.0.0.1", port).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!((client.query_f64("AMS:TEMP?").await.unwrap() - 48.0).abs() < 1e-9);
        assert!(!client.is_desynced());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = ScpiConnector.connect("127.0.0.1", port).await;
        let err = result.err().unwrap();
        assert!(err.to_string().contains("127.0.0.1"));
    }
}
