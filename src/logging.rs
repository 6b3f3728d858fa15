//! Log output for the `pitaya-board` binary.
//!
//! A single `tracing-subscriber` fmt layer writing to stderr, filtered by
//! `RUST_LOG` when set and by the configured level otherwise. Stdout stays
//! reserved for command output.
//!
//! ```no_run
//! use pitaya_board::{config::AppConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! logging::init_from_config(&config)?;
//! tracing::info!(host = %config.board.host, "Session starting");
//! # Ok(())
//! # }
//! ```

use crate::config::AppConfig;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Line format of log events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored, with source locations
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    /// Maximum level when `RUST_LOG` is unset
    pub level: Level,
    /// Line format
    pub format: LogFormat,
    /// Emit span open/close events
    pub span_events: bool,
    /// Colors in `Pretty` output
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            span_events: false,
            ansi: true,
        }
    }
}

impl LogSettings {
    /// Settings from the `[logging]` section.
    pub fn from_config(config: &AppConfig) -> Result<Self, String> {
        Ok(Self {
            level: parse_log_level(&config.logging.level)?,
            format: config.logging.format,
            ..Self::default()
        })
    }
}

/// Install the subscriber described by the `[logging]` section.
pub fn init_from_config(config: &AppConfig) -> Result<(), String> {
    init(&LogSettings::from_config(config)?)
}

/// Install the global subscriber.
///
/// Calling it again after a subscriber is installed is a no-op, so tests
/// may call it freely.
pub fn init(settings: &LogSettings) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_str().to_lowercase()));

    let spans = match settings.span_events {
        true => FmtSpan::NEW | FmtSpan::CLOSE,
        false => FmtSpan::NONE,
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(spans);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match settings.format {
        LogFormat::Pretty => base.pretty().with_ansi(settings.ansi).boxed(),
        LogFormat::Compact => base.compact().with_ansi(false).with_target(false).boxed(),
        LogFormat::Json => base.json().with_current_span(false).boxed(),
    };

    match tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
    {
        Ok(()) => Ok(()),
        // Dispatcher or log bridge installed by an earlier call
        Err(e) if e.to_string().contains("already") => Ok(()),
        Err(e) => Err(format!("Failed to install log subscriber: {}", e)),
    }
}

/// Level from its name, case-insensitive.
pub fn parse_log_level(name: &str) -> Result<Level, String> {
    const NAMES: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    let lower = name.to_ascii_lowercase();
    if !NAMES.contains(&lower.as_str()) {
        return Err(format!(
            "Unknown log level '{}' (expected one of {})",
            name,
            NAMES.join(", ")
        ));
    }
    lower.parse::<Level>().map_err(|e| e.to_string())
}
