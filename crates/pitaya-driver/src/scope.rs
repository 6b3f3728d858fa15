//! Oscilloscope control through the acquisition application

use crate::acquisition::AcquisitionAppClient;
use pitaya_core::board::Channel;
use pitaya_core::error::{AppFailure, ApplicationError, BoardError};
use pitaya_core::state::{DeviceStatus, OperatingState};
use std::sync::Arc;

/// Start/stop and waveform readout of the scope.
pub struct ScopeController {
    app: Arc<AcquisitionAppClient>,
    status: Arc<DeviceStatus>,
}

impl ScopeController {
    /// Controller over the shared status cell.
    pub fn new(app: Arc<AcquisitionAppClient>, status: Arc<DeviceStatus>) -> Self {
        Self { app, status }
    }

    /// Start acquisition. Success enters `RUNNING`, failure `STANDBY`.
    pub async fn start(&self) -> Result<(), ApplicationError> {
        match self.app.start().await {
            Ok(()) => {
                self.status.set_ok(OperatingState::Running);
                Ok(())
            }
            Err(error) => Err(self.app_error(error)),
        }
    }

    /// Stop acquisition. Success enters `ON`.
    ///
    /// On failure the application may still be running.
    pub async fn stop(&self) -> Result<(), ApplicationError> {
        match self.app.stop().await {
            Ok(()) => {
                self.status.set_ok(OperatingState::On);
                Ok(())
            }
            Err(error) => Err(self.app_error(error)),
        }
    }

    /// Whether acquisition is running; an unreachable application reads as
    /// inactive after being reported.
    pub async fn is_active(&self) -> bool {
        match self.app.poll_status().await {
            Ok(status) => status.active,
            Err(error) => {
                self.app_error(error);
                false
            }
        }
    }

    /// Samples of `channel` from the running acquisition.
    ///
    /// - channel outside 1..=2: message set, state untouched, `Some([0.0])`
    /// - application unavailable or without data: `STANDBY`, `None`
    pub async fn read_waveform(&self, channel: i64) -> Option<Vec<f64>> {
        let channel = match Channel::try_from(channel) {
            Ok(channel) => channel,
            Err(error) => {
                self.status.report(&error);
                return Some(vec![0.0]);
            }
        };
        self.status.clear_message();

        let response = match self.app.fetch_data().await {
            Ok(response) => response,
            Err(error) => {
                self.app_error(error);
                return None;
            }
        };

        if !response.is_ok() {
            let reason = response
                .reason
                .clone()
                .unwrap_or_else(|| format!("status {}", response.status));
            self.app_error(self.app.error(AppFailure::NoData(reason)));
            return None;
        }

        match response.channel_values(channel) {
            Some(values) => Some(values),
            None => {
                let failure = AppFailure::Malformed(format!("no dataset for channel {}", channel));
                self.app_error(self.app.error(failure));
                None
            }
        }
    }

    fn app_error(&self, error: ApplicationError) -> ApplicationError {
        tracing::warn!(host = %error.host, "Acquisition application error: {}", error.failure);
        self.status.report(&BoardError::Application(error.clone()));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{DATA_PATH, START_PATH, STOP_PATH};
    use crate::mock::MockAppTransport;

    fn setup() -> (Arc<MockAppTransport>, Arc<DeviceStatus>, ScopeController) {
        let transport = Arc::new(MockAppTransport::new());
        let status = Arc::new(DeviceStatus::new());
        status.set_ok(OperatingState::On);
        let app = Arc::new(AcquisitionAppClient::new("rp.local", transport.clone()));
        (transport, status.clone(), ScopeController::new(app, status))
    }

    #[tokio::test]
    async fn test_start_success_enters_running() {
        let (transport, status, scope) = setup();
        transport.respond(START_PATH, r#"{"status":"OK"}"#);
        status.set_message("old");

        scope.start().await.unwrap();
        assert_eq!(status.state(), OperatingState::Running);
        assert_eq!(status.message(), "");
    }

    #[tokio::test]
    async fn test_start_failure_enters_standby() {
        let (transport, status, scope) = setup();
        transport.respond(START_PATH, r#"{"status":"ERROR","reason":"no such app"}"#);

        assert!(scope.start().await.is_err());
        assert_eq!(status.state(), OperatingState::Standby);
        let message = status.message();
        assert!(message.contains("Device didn't start the app: no such app"));
        assert!(message.contains("scope (Oscilloscope) webapp"));
    }

    #[tokio::test]
    async fn test_stop_success_and_failure() {
        let (transport, status, scope) = setup();
        transport.respond(STOP_PATH, r#"{"status":"OK"}"#);
        status.set_ok(OperatingState::Running);
        scope.stop().await.unwrap();
        assert_eq!(status.state(), OperatingState::On);

        transport.fail(STOP_PATH, "connection reset");
        let err = scope.stop().await.unwrap_err();
        assert!(matches!(err.failure, AppFailure::Transport(_)));
        assert_eq!(status.state(), OperatingState::Standby);
    }

    #[tokio::test]
    async fn test_invalid_channel_returns_zero_sentinel() {
        let (transport, status, scope) = setup();
        status.set_ok(OperatingState::Running);

        assert_eq!(scope.read_waveform(0).await, Some(vec![0.0]));
        assert_eq!(scope.read_waveform(3).await, Some(vec![0.0]));
        assert_eq!(status.state(), OperatingState::Running);
        assert_eq!(status.message(), "Error: Scope channel should be 1 or 2");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_read_waveform_values() {
        let (transport, status, scope) = setup();
        transport.respond(
            DATA_PATH,
            r#"{"status":"OK","datasets":{"g1":[{"data":[[0,1.0],[1,2.0]]},{"data":[]}]}}"#,
        );
        status.set_message("Error: Scope channel should be 1 or 2");

        assert_eq!(scope.read_waveform(1).await, Some(vec![1.0, 2.0]));
        assert_eq!(scope.read_waveform(2).await, Some(vec![]));
        assert_eq!(status.message(), "");
        assert_eq!(status.state(), OperatingState::On);
    }

    #[tokio::test]
    async fn test_read_waveform_absent_when_app_not_ok() {
        let (transport, status, scope) = setup();
        transport.respond(DATA_PATH, r#"{"status":"ERR","reason":"Application not loaded"}"#);

        assert_eq!(scope.read_waveform(1).await, None);
        assert_eq!(status.state(), OperatingState::Standby);
        assert!(status
            .message()
            .contains("Could not fetch data from webapp: Application not loaded"));
    }

    #[tokio::test]
    async fn test_read_waveform_absent_on_transport_failure_or_missing_dataset() {
        let (transport, status, scope) = setup();
        transport.fail(DATA_PATH, "host unreachable");
        assert_eq!(scope.read_waveform(2).await, None);
        assert_eq!(status.state(), OperatingState::Standby);

        status.set_ok(OperatingState::On);
        transport.respond(DATA_PATH, r#"{"status":"OK","datasets":{"g1":[{"data":[]}]}}"#);
        assert_eq!(scope.read_waveform(2).await, None);
        assert_eq!(status.state(), OperatingState::Standby);
    }

    #[tokio::test]
    async fn test_is_active() {
        let (transport, status, scope) = setup();
        transport.respond(DATA_PATH, r#"{"status":"OK"}"#);
        assert!(scope.is_active().await);

        transport.fail(DATA_PATH, "timeout");
        assert!(!scope.is_active().await);
        assert_eq!(status.state(), OperatingState::Standby);
    }
}
