//! Connection supervisor
//!
//! Owns the board handle: opens it, pings it and replaces it on failure.
//! There is no background task. A failed health check is itself the
//! reconnect trigger, and each check makes at most one reconnect attempt.
//! Once `reconnect_tries` reaches `max_reconnect_attempts` only an explicit
//! [`ConnectionSupervisor::connect`] brings the board back.

use pitaya_core::board::{BoardConnector, RemoteBoard};
use pitaya_core::config::ConnectionConfig;
use pitaya_core::error::{BoardError, ConnectionError};
use pitaya_core::state::{DeviceStatus, OperatingState};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Connection bookkeeping. Mutated only by the supervisor.
#[derive(Default)]
pub struct ConnectionState {
    /// Live handle, if the last connect succeeded
    pub handle: Option<Arc<dyn RemoteBoard>>,
    /// Automatic reconnects spent since the last successful round-trip
    pub reconnect_tries: u32,
    /// Most recent connection failure
    pub last_error: Option<ConnectionError>,
}

/// Owns the board handle lifecycle.
pub struct ConnectionSupervisor {
    config: ConnectionConfig,
    connector: Arc<dyn BoardConnector>,
    status: Arc<DeviceStatus>,
    state: RwLock<ConnectionState>,
}

impl ConnectionSupervisor {
    /// Supervisor with no handle yet; call [`connect`](Self::connect) next.
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn BoardConnector>,
        status: Arc<DeviceStatus>,
    ) -> Self {
        Self {
            config,
            connector,
            status,
            state: RwLock::new(ConnectionState::default()),
        }
    }

    /// Connection settings.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Reconnects spent since the last successful round-trip.
    pub async fn reconnect_tries(&self) -> u32 {
        self.state.read().await.reconnect_tries
    }

    /// Most recent connection failure.
    pub async fn last_error(&self) -> Option<ConnectionError> {
        self.state.read().await.last_error.clone()
    }

    /// Whether a handle is held.
    pub async fn is_connected(&self) -> bool {
        self.state.read().await.handle.is_some()
    }

    /// Open a new handle, replacing any existing one.
    ///
    /// Success resets the retry counter and enters `ON`; failure enters
    /// `FAULT` with the connection message.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut state = self.state.write().await;
        self.connect_locked(&mut state).await
    }

    /// Ping the current handle.
    ///
    /// Success resets the retry counter and leaves the operating state
    /// alone. Failure reports the connection error and, while the retry
    /// budget allows, spends one try on a reconnect.
    pub async fn check_health(&self) -> Result<(), ConnectionError> {
        let mut state = self.state.write().await;

        let pinged = match state.handle.clone() {
            Some(handle) => handle.ping().await.map_err(|e| format!("{:#}", e)),
            None => Err("Not connected".to_string()),
        };

        match pinged {
            Ok(()) => {
                state.reconnect_tries = 0;
                Ok(())
            }
            Err(message) => {
                let error = self.record_failure(&mut state, message);
                tracing::warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    attempt = state.reconnect_tries,
                    "Health check failed"
                );
                if state.reconnect_tries < self.config.max_reconnect_attempts {
                    state.reconnect_tries += 1;
                    // A successful reconnect still reports this check as failed
                    let _ = self.connect_locked(&mut state).await;
                }
                Err(error)
            }
        }
    }

    /// Run a register-level operation against the current handle.
    ///
    /// A failure is reported as a connection error (`FAULT`) and drops the
    /// handle, so the next [`check_health`](Self::check_health) takes the
    /// reconnect path. The retry counter is left to health checks.
    pub async fn with_board<T, F, Fut>(&self, op: F) -> Result<T, ConnectionError>
    where
        F: FnOnce(Arc<dyn RemoteBoard>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let handle = self.state.read().await.handle.clone();
        let (used, result) = match handle {
            Some(handle) => (
                Some(handle.clone()),
                op(handle).await.map_err(|e| format!("{:#}", e)),
            ),
            None => (None, Err("Not connected".to_string())),
        };

        match result {
            Ok(value) => Ok(value),
            Err(message) => {
                let mut state = self.state.write().await;
                // Keep a handle opened concurrently by connect()
                let same = match (&state.handle, &used) {
                    (Some(current), Some(used)) => Arc::ptr_eq(current, used),
                    _ => false,
                };
                if same {
                    tracing::debug!(host = %self.config.host, "Dropping failed board handle");
                    state.handle = None;
                }
                Err(self.record_failure(&mut state, message))
            }
        }
    }

    async fn connect_locked(&self, state: &mut ConnectionState) -> Result<(), ConnectionError> {
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            "Connecting to board"
        );

        match self
            .connector
            .connect(&self.config.host, self.config.port)
            .await
        {
            Ok(handle) => {
                state.handle = Some(handle);
                state.reconnect_tries = 0;
                state.last_error = None;
                self.status.set_ok(OperatingState::On);
                tracing::info!(host = %self.config.host, "Board connection established");
                Ok(())
            }
            Err(e) => {
                state.handle = None;
                let error = self.record_failure(state, format!("{:#}", e));
                tracing::warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    attempt = state.reconnect_tries,
                    max = self.config.max_reconnect_attempts,
                    "Board connection failed: {}",
                    error.message
                );
                Err(error)
            }
        }
    }

    fn record_failure(&self, state: &mut ConnectionState, message: String) -> ConnectionError {
        let error = ConnectionError::new(&self.config, message, state.reconnect_tries);
        state.last_error = Some(error.clone());
        self.status.report(&BoardError::Connection(error.clone()));
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBoard, MockConnector};

    fn setup(max: u32) -> (Arc<MockConnector>, Arc<DeviceStatus>, ConnectionSupervisor) {
        let connector = Arc::new(MockConnector::new(Arc::new(MockBoard::new())));
        let status = Arc::new(DeviceStatus::new());
        let config = ConnectionConfig::new("rp.local").with_max_reconnect_attempts(max);
        let supervisor = ConnectionSupervisor::new(config, connector.clone(), status.clone());
        (connector, status, supervisor)
    }

    #[tokio::test]
    async fn test_connect_success_enters_on() {
        let (_, status, supervisor) = setup(3);
        status.set_message("stale");
        supervisor.connect().await.unwrap();
        assert_eq!(status.state(), OperatingState::On);
        assert_eq!(status.message(), "");
        assert!(supervisor.is_connected().await);
    }

    #[tokio::test]
    async fn test_connect_failure_enters_fault() {
        let (connector, status, supervisor) = setup(3);
        connector.set_online(false);

        let err = supervisor.connect().await.unwrap_err();
        assert_eq!(err.attempt, 0);
        assert_eq!(status.state(), OperatingState::Fault);
        assert!(status
            .message()
            .starts_with("Could not connect to the board @ rp.local:18861\n"));
        assert!(status.message().contains("Reconnect attempt 0 / 3"));
        assert_eq!(supervisor.last_error().await, Some(err));
        assert!(!supervisor.is_connected().await);
    }

    #[tokio::test]
    async fn test_health_check_ok_keeps_state() {
        let (_, status, supervisor) = setup(3);
        supervisor.connect().await.unwrap();
        status.set_ok(OperatingState::Standby);

        supervisor.check_health().await.unwrap();
        assert_eq!(status.state(), OperatingState::Standby);
        assert_eq!(supervisor.reconnect_tries().await, 0);
    }

    #[tokio::test]
    async fn test_failed_check_reconnects_once() {
        let (connector, status, supervisor) = setup(3);
        supervisor.connect().await.unwrap();

        // Link drops but the board accepts a fresh connection
        connector.board().set_link_up(false);
        connector.set_accepting(true);
        let attempts_before = connector.attempts();

        assert!(supervisor.check_health().await.is_err());
        assert_eq!(connector.attempts(), attempts_before + 1);
        // Reconnect succeeded: counter reset, state back to ON
        assert_eq!(supervisor.reconnect_tries().await, 0);
        assert_eq!(status.state(), OperatingState::On);
    }

    #[tokio::test]
    async fn test_counter_increments_by_one_and_saturates() {
        let (connector, _, supervisor) = setup(4);
        supervisor.connect().await.unwrap();
        connector.set_online(false);

        for expected in 1..=4 {
            assert!(supervisor.check_health().await.is_err());
            assert_eq!(supervisor.reconnect_tries().await, expected);
        }
        let attempts = connector.attempts();
        assert!(supervisor.check_health().await.is_err());
        assert_eq!(supervisor.reconnect_tries().await, 4);
        assert_eq!(connector.attempts(), attempts);
    }

    #[tokio::test]
    async fn test_zero_budget_never_reconnects() {
        let (connector, status, supervisor) = setup(0);
        supervisor.connect().await.unwrap();
        connector.set_online(false);
        let attempts = connector.attempts();

        assert!(supervisor.check_health().await.is_err());
        assert_eq!(connector.attempts(), attempts);
        assert_eq!(supervisor.reconnect_tries().await, 0);
        assert!(status.message().ends_with("Not trying again."));
    }

    #[tokio::test]
    async fn test_register_failure_reports_fault_without_spending_tries() {
        let (connector, status, supervisor) = setup(3);
        supervisor.connect().await.unwrap();
        connector.board().set_link_up(false);

        let result = supervisor.with_board(|b| async move { b.leds().await }).await;
        assert!(result.is_err());
        assert_eq!(status.state(), OperatingState::Fault);
        assert_eq!(supervisor.reconnect_tries().await, 0);
        assert!(!supervisor.is_connected().await);
    }

    #[tokio::test]
    async fn test_health_check_recovers_after_register_failure() {
        let (connector, status, supervisor) = setup(3);
        supervisor.connect().await.unwrap();
        connector.board().set_link_up(false);
        assert!(supervisor
            .with_board(|b| async move { b.leds().await })
            .await
            .is_err());

        connector.board().set_link_up(true);
        let attempts = connector.attempts();
        // No handle: this check fails and reconnects
        assert!(supervisor.check_health().await.is_err());
        assert_eq!(connector.attempts(), attempts + 1);
        assert_eq!(status.state(), OperatingState::On);
        assert_eq!(status.message(), "");

        supervisor.check_health().await.unwrap();
        assert_eq!(supervisor.reconnect_tries().await, 0);
        assert_eq!(status.state(), OperatingState::On);
    }

    #[tokio::test]
    async fn test_with_board_without_handle() {
        let (_, status, supervisor) = setup(3);
        let err = supervisor
            .with_board(|b| async move { b.temperature().await })
            .await
            .unwrap_err();
        assert_eq!(err.message, "Not connected");
        assert_eq!(status.state(), OperatingState::Fault);
    }
}
