//! Operating state derivation
//!
//! The reported state is layered, last writer wins:
//!
//! 1. `FAULT` from the connection layer beats everything; nothing is queried.
//! 2. An unavailable acquisition application lowers the base to `STANDBY`.
//! 3. Any active generator channel or running acquisition makes it `RUNNING`.
//! 4. Otherwise the base set by the lower layers (`ON` / `STANDBY`) stands.

use crate::acquisition::AcquisitionAppClient;
use crate::supervisor::ConnectionSupervisor;
use pitaya_core::board::Channel;
use pitaya_core::error::{AppFailure, BoardError};
use pitaya_core::state::{DeviceStatus, OperatingState, StatusReport};
use std::sync::Arc;

/// Derives the externally reported state from live board introspection.
pub struct OperatingStateMachine {
    supervisor: Arc<ConnectionSupervisor>,
    app: Arc<AcquisitionAppClient>,
    status: Arc<DeviceStatus>,
}

impl OperatingStateMachine {
    /// State machine over the shared status cell.
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        app: Arc<AcquisitionAppClient>,
        status: Arc<DeviceStatus>,
    ) -> Self {
        Self {
            supervisor,
            app,
            status,
        }
    }

    /// Compute the current state and status message.
    pub async fn derive_state(&self) -> StatusReport {
        if self.status.state() == OperatingState::Fault {
            return self.status.snapshot();
        }

        let mut generator_active = false;
        for channel in Channel::ALL {
            let zero = self
                .supervisor
                .with_board(|board| async move { board.output_zero(channel).await })
                .await;
            match zero {
                Ok(zero) => generator_active |= !zero,
                // Reported as FAULT by the supervisor
                Err(_) => return self.status.snapshot(),
            }
        }

        let acquisition_active = match self.app.poll_status().await {
            Ok(status) if status.active => true,
            Ok(status) => {
                if let Some(reason) = status.reason {
                    let error = self.app.error(AppFailure::NoData(reason));
                    self.status.report(&BoardError::Application(error));
                }
                false
            }
            Err(error) => {
                tracing::warn!("Acquisition status unavailable: {}", error.failure);
                self.status.report(&BoardError::Application(error));
                false
            }
        };

        if generator_active || acquisition_active {
            self.status.set_state(OperatingState::Running);
        } else if self.status.state() == OperatingState::Running {
            // Activity ended since the last derivation
            self.status.set_state(OperatingState::On);
        }

        self.status.snapshot()
    }

    /// Operator-facing status line: `Device is in <STATE> state.\n<message>`.
    ///
    /// Derives the state first, so the line never shows a stale state.
    pub async fn status_text(&self) -> String {
        self.derive_state().await.description()
    }
}
