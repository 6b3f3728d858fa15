//! Client for the companion acquisition application
//!
//! The scope application runs next to the board and is driven over plain
//! HTTP GET requests answering a JSON envelope:
//!
//! ```json
//! {"status": "OK", "datasets": {"g1": [{"data": [[0, 1.0], [1, 2.0]]}, {"data": []}]}}
//! {"status": "ERR", "reason": "Application not loaded"}
//! ```
//!
//! Each call is one round-trip; retry policy belongs to the caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pitaya_core::board::Channel;
use pitaya_core::error::{AppFailure, ApplicationError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Starts the scope application
pub const START_PATH: &str = "/bazaar?start=scope";

/// Stops the running application
pub const STOP_PATH: &str = "/bazaar?stop=";

/// Acquisition status and data
pub const DATA_PATH: &str = "/data";

/// Default HTTP timeout in milliseconds
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// Transport
// =============================================================================

/// Fetches a path from the application host and returns the raw body.
#[async_trait]
pub trait AppTransport: Send + Sync {
    /// GET `path` (including the query string).
    async fn get(&self, path: &str) -> Result<String>;
}

/// [`AppTransport`] over HTTP.
///
/// `ureq` is blocking; requests run on tokio's blocking pool.
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Transport for `http://<host>` with a global per-request timeout.
    pub fn new(host: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            base_url: format!("http://{}", host),
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

#[async_trait]
impl AppTransport for HttpTransport {
    async fn get(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let agent = self.agent.clone();
        tracing::debug!(%url, "HTTP GET");

        tokio::task::spawn_blocking(move || -> Result<String> {
            let mut response = agent
                .get(&url)
                .call()
                .with_context(|| format!("GET {} failed", url))?;
            response
                .body_mut()
                .read_to_string()
                .with_context(|| format!("Failed to read response body from {}", url))
        })
        .await
        .context("HTTP worker task failed")?
    }
}

// =============================================================================
// Response envelope
// =============================================================================

/// JSON envelope returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppResponse {
    /// `"OK"` or an error marker
    pub status: String,
    /// Failure explanation, present on errors
    #[serde(default)]
    pub reason: Option<String>,
    /// Sampled data, `/data` only
    #[serde(default)]
    pub datasets: Option<Datasets>,
}

/// Dataset groups of a `/data` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Datasets {
    /// One entry per scope channel
    #[serde(default)]
    pub g1: Vec<Dataset>,
}

/// Samples of one channel as `[timestamp, value]` points.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Dataset {
    /// Sample points
    #[serde(default)]
    pub data: Vec<Vec<f64>>,
}

impl AppResponse {
    /// Whether the application reported success.
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    fn reason_text(&self) -> String {
        self.reason
            .clone()
            .unwrap_or_else(|| format!("status {}", self.status))
    }

    /// Sample values of `channel` with the timestamps dropped.
    ///
    /// `None` when the channel has no dataset or a point has no value.
    pub fn channel_values(&self, channel: Channel) -> Option<Vec<f64>> {
        let dataset = self.datasets.as_ref()?.g1.get(channel.index())?;
        dataset
            .data
            .iter()
            .map(|point| point.get(1).copied())
            .collect()
    }
}

/// Live acquisition status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionStatus {
    /// Acquisition is running (`status == "OK"`)
    pub active: bool,
    /// `reason` reported alongside a non-`OK` status
    pub reason: Option<String>,
}

// =============================================================================
// AcquisitionAppClient
// =============================================================================

/// Start/stop/status client for the acquisition application.
pub struct AcquisitionAppClient {
    host: String,
    transport: Arc<dyn AppTransport>,
}

impl AcquisitionAppClient {
    /// Client over an arbitrary transport.
    pub fn new(host: impl Into<String>, transport: Arc<dyn AppTransport>) -> Self {
        Self {
            host: host.into(),
            transport,
        }
    }

    /// Client over HTTP to `host`.
    pub fn http(host: impl Into<String>, timeout: Duration) -> Self {
        let host = host.into();
        let transport = Arc::new(HttpTransport::new(&host, timeout));
        Self::new(host, transport)
    }

    /// Host the application runs on.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Start the scope application.
    pub async fn start(&self) -> Result<(), ApplicationError> {
        let response = self.request(START_PATH).await?;
        if !response.is_ok() {
            return Err(self.error(AppFailure::Rejected {
                action: "start",
                reason: response.reason_text(),
            }));
        }
        tracing::info!(host = %self.host, "Scope application started");
        Ok(())
    }

    /// Stop the running application.
    pub async fn stop(&self) -> Result<(), ApplicationError> {
        let response = self.request(STOP_PATH).await?;
        if !response.is_ok() {
            return Err(self.error(AppFailure::Rejected {
                action: "stop",
                reason: response.reason_text(),
            }));
        }
        tracing::info!(host = %self.host, "Scope application stopped");
        Ok(())
    }

    /// Poll whether acquisition is active.
    ///
    /// Transport and parse failures are errors, never "inactive".
    pub async fn poll_status(&self) -> Result<AcquisitionStatus, ApplicationError> {
        let response = self.request(DATA_PATH).await?;
        Ok(AcquisitionStatus {
            active: response.is_ok(),
            reason: if response.is_ok() {
                None
            } else {
                response.reason
            },
        })
    }

    /// Fetch the full `/data` envelope.
    pub async fn fetch_data(&self) -> Result<AppResponse, ApplicationError> {
        self.request(DATA_PATH).await
    }

    /// Wrap a failure with this client's host.
    pub fn error(&self, failure: AppFailure) -> ApplicationError {
        ApplicationError::new(self.host.clone(), failure)
    }

    async fn request(&self, path: &str) -> Result<AppResponse, ApplicationError> {
        let body = self
            .transport
            .get(path)
            .await
            .map_err(|e| self.error(AppFailure::Transport(format!("{:#}", e))))?;
        serde_json::from_str(&body).map_err(|e| self.error(AppFailure::Malformed(e.to_string())))
    }
}
