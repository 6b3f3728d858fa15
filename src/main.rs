//! CLI Entry Point for pitaya-board
//!
//! Provides a command-line interface to one Red Pitaya board:
//! - Query the derived operating state and run health checks
//! - Read and write attributes, execute commands
//! - Watch the board, reconnecting through repeated health checks
//!
//! # Usage
//!
//! ```bash
//! pitaya-board --host rp-f01234.local status
//! pitaya-board --host rp-f01234.local write leds 255
//! pitaya-board --host rp-f01234.local exec start_generator_ch1 '"1 1000 sine"'
//! pitaya-board --host rp-f01234.local --mock watch --interval-ms 500 --count 10
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::providers::Serialized;
use pitaya_board::config::AppConfig;
use pitaya_board::logging::{self, LogFormat};
use pitaya_core::capabilities::{AttributeAccess, Commandable};
use pitaya_driver::RedPitayaBoard;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pitaya-board", version)]
#[command(about = "Red Pitaya board session", long_about = None)]
struct Cli {
    /// Configuration file (default: pitaya.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Board hostname or IP address
    #[arg(long, global = true)]
    host: Option<String>,

    /// SCPI server port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Use a simulated board
    #[arg(long, global = true)]
    mock: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the operating state and status message
    Status,

    /// Run one health check (reconnects on failure)
    Ping,

    /// List attributes and commands
    Attributes,

    /// Read an attribute
    Read {
        /// Attribute name
        name: String,
    },

    /// Write an attribute
    Write {
        /// Attribute name
        name: String,
        /// JSON value, e.g. `255`, `true`, `1000.0`
        value: String,
    },

    /// Execute a command
    Exec {
        /// Command name
        command: String,
        /// JSON argument, e.g. `2` or `"1 1000 sine"`
        args: Option<String>,
    },

    /// Health-check and report the state periodically
    Watch {
        /// Delay between checks
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
        /// Stop after this many checks
        #[arg(long)]
        count: Option<u64>,
    },
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
        let mut figment = AppConfig::figment(self.config.as_deref())?;
        if let Some(host) = &self.host {
            figment = figment.merge(Serialized::default("board.host", host));
        }
        if let Some(port) = self.port {
            figment = figment.merge(Serialized::default("board.port", port));
        }
        if self.mock {
            figment = figment.merge(Serialized::default("board.mock", true));
        }
        if let Some(level) = &self.log_level {
            figment = figment.merge(Serialized::default("logging.level", level));
        }
        if let Some(format) = self.log_format {
            figment = figment.merge(Serialized::default("logging.format", format));
        }
        Ok(AppConfig::extract(figment)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    tracing::debug!(?config, "Configuration loaded");
    let board = RedPitayaBoard::new_async(&config.board.driver_config()).await;

    match cli.command {
        Commands::Status => {
            println!("{}", board.status().await);
            Ok(())
        }
        Commands::Ping => {
            println!("{}", board.ping().await);
            Ok(())
        }
        Commands::Attributes => {
            list_capabilities(&board);
            Ok(())
        }
        Commands::Read { name } => {
            let value = board.read_attribute(&name).await?;
            println!("{}", value);
            Ok(())
        }
        Commands::Write { name, value } => {
            let value = parse_json(&value)?;
            board.write_attribute(&name, value).await?;
            Ok(())
        }
        Commands::Exec { command, args } => {
            let args = args.as_deref().map(parse_json).transpose()?.unwrap_or(Value::Null);
            let result = board.execute_command(&command, args).await?;
            if !result.is_null() {
                println!("{}", result);
            }
            Ok(())
        }
        Commands::Watch { interval_ms, count } => {
            watch(board, Duration::from_millis(interval_ms), count).await;
            Ok(())
        }
    }
}

fn list_capabilities(board: &RedPitayaBoard) {
    println!("Attributes:");
    for info in board.attributes() {
        let access = if info.writable { "rw" } else { "r " };
        let unit = info.unit.map(|u| format!(" [{}]", u)).unwrap_or_default();
        println!("  {} {:<22}{} {}", access, info.name, unit, info.description);
    }
    println!();
    println!("Commands:");
    for info in board.commands() {
        let argument = info.argument.map(|a| format!(" <{}>", a)).unwrap_or_default();
        println!("  {}{}  {}", info.name, argument, info.description);
    }
}

/// JSON value; a bare word is taken as a string.
fn parse_json(text: &str) -> Result<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(_) if !text.trim().is_empty() => Ok(Value::String(text.to_string())),
        Err(e) => Err(e).context("Empty JSON argument"),
    }
}

async fn watch(board: Arc<RedPitayaBoard>, interval: Duration, count: Option<u64>) {
    let mut ticker = tokio::time::interval(interval);
    let mut checks = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }

        let ping = board.ping().await;
        let report = board.report().await;
        let tries = board.supervisor().reconnect_tries().await;
        println!("ping={} state={} reconnect_tries={}", ping, report.state, tries);
        if !report.message.is_empty() {
            println!("  {}", report.message.replace('\n', "\n  "));
        }

        checks += 1;
        if count.is_some_and(|limit| checks >= limit) {
            break;
        }
    }
}
