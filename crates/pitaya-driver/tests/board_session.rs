//! End-to-end session behavior over the in-memory board and application.

use pitaya_core::board::{Channel, VoltageRail};
use pitaya_core::config::ConnectionConfig;
use pitaya_core::state::OperatingState;
use pitaya_driver::acquisition::{AcquisitionAppClient, DATA_PATH, START_PATH};
use pitaya_driver::mock::{MockAppTransport, MockBoard, MockConnector};
use pitaya_driver::RedPitayaBoard;
use std::sync::Arc;

const ACTIVE_BODY: &str = r#"{"status":"OK","datasets":{"g1":[{"data":[[0,1.0],[1,2.0]]},{"data":[[0,-1.0]]}]}}"#;
const STOPPED_BODY: &str = r#"{"status":"STOPPED"}"#;
const NOT_LOADED_BODY: &str = r#"{"status":"ERR","reason":"Application not loaded"}"#;

struct Session {
    connector: Arc<MockConnector>,
    transport: Arc<MockAppTransport>,
    board: Arc<RedPitayaBoard>,
}

async fn session(max_reconnect_attempts: u32) -> Session {
    let connector = Arc::new(MockConnector::new(Arc::new(MockBoard::new())));
    let transport = Arc::new(MockAppTransport::new());
    transport.respond(DATA_PATH, STOPPED_BODY);

    let config = ConnectionConfig::new("rp-f01234.local")
        .with_max_reconnect_attempts(max_reconnect_attempts);
    let app = AcquisitionAppClient::new("rp-f01234.local", transport.clone());
    let board = RedPitayaBoard::init(config, connector.clone(), app).await;

    Session {
        connector,
        transport,
        board,
    }
}

#[tokio::test]
async fn state_precedence_over_all_combinations() {
    for mask in 0u8..32 {
        let fault = mask & 0b10000 != 0;
        let app_down = mask & 0b01000 != 0;
        let gen1 = mask & 0b00100 != 0;
        let gen2 = mask & 0b00010 != 0;
        // An unreachable application cannot be acquiring
        let acquisition = mask & 0b00001 != 0 && !app_down;

        let s = session(3).await;
        let mock = s.connector.board();
        mock.set_channel_active(Channel::One, gen1);
        mock.set_channel_active(Channel::Two, gen2);
        if app_down {
            s.transport.fail(DATA_PATH, "Connection refused (os error 111)");
        } else {
            s.transport.respond(
                DATA_PATH,
                if acquisition { ACTIVE_BODY } else { STOPPED_BODY },
            );
        }
        if fault {
            mock.set_link_up(false);
        }

        let expected = if fault {
            OperatingState::Fault
        } else if gen1 || gen2 || acquisition {
            OperatingState::Running
        } else if app_down {
            OperatingState::Standby
        } else {
            OperatingState::On
        };

        let report = s.board.report().await;
        assert_eq!(
            report.state, expected,
            "fault={} app_down={} gen1={} gen2={} acquisition={}",
            fault, app_down, gen1, gen2, acquisition
        );
        if fault {
            // The application is never consulted once the board is lost
            assert!(s.transport.requests().is_empty());
            assert!(report.message.starts_with("Could not connect to the board"));
        } else if app_down {
            assert!(report
                .message
                .contains("You need to have scope (Oscilloscope) webapp installed"));
        }
    }
}

#[tokio::test]
async fn fault_persists_until_reconnect() {
    let s = session(3).await;
    s.connector.board().set_link_up(false);
    assert_eq!(s.board.state().await, OperatingState::Fault);

    // Board is back, but nothing reconnected yet
    s.connector.board().set_link_up(true);
    s.connector.board().set_channel_active(Channel::One, true);
    assert_eq!(s.board.state().await, OperatingState::Fault);

    s.board.connect().await.unwrap();
    assert_eq!(s.board.state().await, OperatingState::Running);
}

#[tokio::test]
async fn register_failure_recovers_through_health_checks() {
    let s = session(3).await;
    s.connector.board().set_link_up(false);
    assert!(s.board.leds().await.is_err());
    assert_eq!(s.board.device_status().state(), OperatingState::Fault);

    s.connector.board().set_link_up(true);
    // The failed handle was dropped: this check reconnects
    assert_eq!(s.board.ping().await, "FAILED");
    assert_eq!(s.board.supervisor().reconnect_tries().await, 0);
    assert_eq!(s.board.ping().await, "OK");

    assert_eq!(s.board.leds().await.unwrap(), 0);
    assert_eq!(s.board.state().await, OperatingState::On);
}

#[tokio::test]
async fn activity_ending_returns_to_on() {
    let s = session(3).await;
    s.board
        .start_generator(Channel::One, "1 1000 sine")
        .await
        .unwrap();
    assert_eq!(s.board.state().await, OperatingState::Running);
    assert!(s.board.generator_active(Channel::One).await.unwrap());

    s.board.stop_generator(Channel::One).await.unwrap();
    assert_eq!(s.board.state().await, OperatingState::On);
}

#[tokio::test]
async fn bounded_reconnect_with_explicit_recovery() {
    let s = session(2).await;
    assert_eq!(s.board.device_status().state(), OperatingState::On);
    s.connector.set_online(false);

    assert_eq!(s.board.ping().await, "FAILED");
    assert_eq!(s.board.supervisor().reconnect_tries().await, 1);
    assert_eq!(s.board.device_status().state(), OperatingState::Fault);

    assert_eq!(s.board.ping().await, "FAILED");
    assert_eq!(s.board.supervisor().reconnect_tries().await, 2);
    let message = s.board.device_status().message();
    assert!(message.contains("Reconnect attempt 2 / 2"), "{}", message);
    assert!(message.ends_with("Not trying again."), "{}", message);

    // Budget spent: no further connection attempts
    let attempts = s.connector.attempts();
    assert_eq!(s.board.ping().await, "FAILED");
    assert_eq!(s.board.supervisor().reconnect_tries().await, 2);
    assert_eq!(s.connector.attempts(), attempts);

    s.connector.set_online(true);
    s.board.connect().await.unwrap();
    assert_eq!(s.board.supervisor().reconnect_tries().await, 0);
    assert_eq!(s.board.device_status().state(), OperatingState::On);
    assert_eq!(s.board.device_status().message(), "");
    assert_eq!(s.board.ping().await, "OK");
}

#[tokio::test]
async fn ping_recovers_after_transient_drop() {
    let s = session(5).await;
    s.connector.set_online(false);
    assert_eq!(s.board.ping().await, "FAILED");
    assert_eq!(s.board.ping().await, "FAILED");

    s.connector.set_online(true);
    // No handle yet: this check fails, then reconnects
    assert_eq!(s.board.ping().await, "FAILED");
    assert_eq!(s.board.supervisor().reconnect_tries().await, 0);
    assert_eq!(s.board.ping().await, "OK");
    assert_eq!(s.board.state().await, OperatingState::On);
}

#[tokio::test]
async fn missing_application_is_standby_with_working_registers() {
    let s = session(3).await;
    s.transport.respond(DATA_PATH, NOT_LOADED_BODY);

    let report = s.board.report().await;
    assert_eq!(report.state, OperatingState::Standby);
    assert!(report
        .message
        .contains("You need to have scope (Oscilloscope) webapp installed"));

    assert!((s.board.voltage(VoltageRail::Ddr).await.unwrap() - 1.5).abs() < 1e-9);
    s.board.set_leds(0x0f).await.unwrap();
    assert_eq!(s.board.leds().await.unwrap(), 0x0f);
    assert_eq!(s.board.ping().await, "OK");
    assert_eq!(s.board.device_status().state(), OperatingState::Standby);

    // A generator still counts as activity
    s.board
        .start_generator(Channel::Two, "0.5 200 sqr")
        .await
        .unwrap();
    assert_eq!(s.board.state().await, OperatingState::Running);
}

#[tokio::test]
async fn waveform_readout() {
    let s = session(3).await;
    s.transport.respond(START_PATH, r#"{"status":"OK"}"#);
    s.board.set_scope_active(true).await.unwrap();
    s.transport.respond(DATA_PATH, ACTIVE_BODY);

    assert_eq!(s.board.scope_data(1).await, Some(vec![1.0, 2.0]));
    assert_eq!(s.board.scope_data(2).await, Some(vec![-1.0]));

    assert_eq!(s.board.scope_data(0).await, Some(vec![0.0]));
    assert_eq!(s.board.scope_data(3).await, Some(vec![0.0]));
    assert_eq!(s.board.device_status().state(), OperatingState::Running);
    assert_eq!(
        s.board.device_status().message(),
        "Error: Scope channel should be 1 or 2"
    );

    s.transport.respond(DATA_PATH, NOT_LOADED_BODY);
    assert_eq!(s.board.scope_data(1).await, None);
    assert_eq!(s.board.device_status().state(), OperatingState::Standby);
}

#[tokio::test]
async fn status_line_format() {
    let s = session(3).await;
    assert_eq!(s.board.status().await, "Device is in ON state.\n");

    s.connector.board().set_link_up(false);
    let status = s.board.status().await;
    assert!(status.starts_with("Device is in FAULT state.\nCould not connect to the board @ rp-f01234.local:18861\n"));
}
