//! Signal generator control
//!
//! Starting a channel runs the board's generator binary through command
//! execution; stopping it writes the output-zero register directly, which
//! needs neither the binary nor the acquisition application.

use crate::supervisor::ConnectionSupervisor;
use pitaya_core::board::Channel;
use pitaya_core::error::ConnectionError;
use pitaya_core::state::{DeviceStatus, OperatingState};
use std::sync::Arc;

/// Generator binary on the board host.
pub const GENERATE_BIN: &str = "/opt/bin/generate";

/// Start/stop of the two generator channels.
pub struct GeneratorController {
    supervisor: Arc<ConnectionSupervisor>,
    status: Arc<DeviceStatus>,
}

impl GeneratorController {
    /// Controller over the supervised board.
    pub fn new(supervisor: Arc<ConnectionSupervisor>, status: Arc<DeviceStatus>) -> Self {
        Self { supervisor, status }
    }

    /// Start `channel` with caller-encoded parameters
    /// (`<Vpp amplitude> <frequency Hz> <sine|sqr|tri>`).
    ///
    /// The parameter string is forwarded as is.
    // TODO: validate amplitude/frequency/shape once the generator binary's
    // accepted ranges are documented.
    pub async fn start(&self, channel: Channel, parameters: &str) -> Result<(), ConnectionError> {
        let command = format!("{} {} {}", GENERATE_BIN, channel.number(), parameters);
        tracing::info!(%channel, "Starting generator: {}", command);
        self.supervisor
            .with_board(|board| async move { board.run_command(&command).await })
            .await
    }

    /// Force `channel`'s output to zero. Success enters `ON`.
    pub async fn stop(&self, channel: Channel) -> Result<(), ConnectionError> {
        self.supervisor
            .with_board(|board| async move { board.set_output_zero(channel, true).await })
            .await?;
        tracing::info!(%channel, "Generator stopped");
        self.status.set_state(OperatingState::On);
        Ok(())
    }

    /// Whether `channel` is producing output.
    pub async fn is_active(&self, channel: Channel) -> Result<bool, ConnectionError> {
        let zero = self
            .supervisor
            .with_board(|board| async move { board.output_zero(channel).await })
            .await?;
        Ok(!zero)
    }
}
