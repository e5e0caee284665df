//! Integration tests for the broker connection lifecycle against the
//! loopback broker.

use std::sync::Arc;

use crate::mock_ports::{CONTROL, Harness, MockBodies, STATUS};

use beltctl::app::ports::{MessageHandler, Publisher};
use beltctl::app::service::ControlService;
use beltctl::broker::loopback::LoopbackBroker;
use beltctl::broker::{BrokerConnection, ConnectionConfig, Credentials, LinkState, TlsPolicy};
use beltctl::config::ControllerConfig;
use beltctl::{ConnectionError, Error, PublishError, SubscriptionError};

struct Ignore;

impl MessageHandler for Ignore {
    fn on_message(&self, _topic: &str, _payload: &[u8]) {}
}

fn connect(
    broker: &LoopbackBroker,
    config: ConnectionConfig,
) -> Result<BrokerConnection<beltctl::broker::loopback::LoopbackClient>, ConnectionError> {
    let mut connector = broker.clone();
    BrokerConnection::connect(&mut connector, config, CONTROL, Arc::new(Ignore))
}

// ── Connect ───────────────────────────────────────────────────

#[test]
fn connect_subscribes_control_and_becomes_ready() {
    let h = Harness::start();
    assert_eq!(h.connection.state(), LinkState::Ready);
    assert!(h.connection.is_connected());
    assert_eq!(h.connection.control_topic(), CONTROL);
}

#[test]
fn every_connect_gets_a_fresh_prefixed_client_id() {
    let broker = LoopbackBroker::new();
    let a = connect(&broker, ConnectionConfig::default()).unwrap();
    let b = connect(&broker, ConnectionConfig::default()).unwrap();
    assert_ne!(a.client_id(), b.client_id());
    assert!(a.client_id().starts_with("conveyor-"));
    assert_eq!(broker.client_ids(), vec![a.client_id().to_string(), b.client_id().to_string()]);
}

#[test]
fn unreachable_broker_fails_without_retry() {
    let broker = LoopbackBroker::new();
    broker.set_online(false);
    assert_eq!(
        connect(&broker, ConnectionConfig::default()).err(),
        Some(ConnectionError::Handshake)
    );
    assert!(broker.client_ids().is_empty());
}

#[test]
fn wrong_credentials_are_an_authentication_error() {
    let broker = LoopbackBroker::new();
    broker.require_credentials("belt", "s3cret");

    let anonymous = connect(&broker, ConnectionConfig::default());
    assert_eq!(anonymous.err(), Some(ConnectionError::Authentication));

    let wrong = ConnectionConfig {
        credentials: Some(Credentials {
            username: "belt".into(),
            password: "guess".into(),
        }),
        ..ConnectionConfig::default()
    };
    assert_eq!(connect(&broker, wrong).err(), Some(ConnectionError::Authentication));

    let right = ConnectionConfig {
        credentials: Some(Credentials {
            username: "belt".into(),
            password: "s3cret".into(),
        }),
        ..ConnectionConfig::default()
    };
    assert_eq!(connect(&broker, right).unwrap().state(), LinkState::Ready);
}

#[test]
fn invalid_settings_never_reach_the_broker() {
    let broker = LoopbackBroker::new();
    let bad_port = ConnectionConfig {
        port: 0,
        ..ConnectionConfig::default()
    };
    assert!(matches!(
        connect(&broker, bad_port).err(),
        Some(ConnectionError::InvalidConfig(_))
    ));

    let bad_ca = ConnectionConfig {
        tls: TlsPolicy::PinnedCa {
            ca_pem: "garbage".into(),
        },
        ..ConnectionConfig::default()
    };
    assert!(matches!(
        connect(&broker, bad_ca).err(),
        Some(ConnectionError::Security(_))
    ));
    assert!(broker.client_ids().is_empty());
}

#[test]
fn start_surfaces_connection_errors() {
    let mut broker = LoopbackBroker::new();
    broker.set_online(false);
    let result = ControlService::start(&mut broker, &ControllerConfig::default(), MockBodies::new());
    assert_eq!(result.err(), Some(Error::Connection(ConnectionError::Handshake)));
}

#[test]
fn start_rejects_invalid_config_before_connecting() {
    let mut broker = LoopbackBroker::new();
    let mut config = ControllerConfig::default();
    config.topics.status = config.topics.control.clone();
    let result = ControlService::start(&mut broker, &config, MockBodies::new());
    assert!(matches!(result.err(), Some(Error::Config(_))));
    assert!(broker.client_ids().is_empty());
}

#[test]
fn rejected_control_subscription_leaves_link_connected_not_ready() {
    let broker = LoopbackBroker::new();
    broker.reject_topic(CONTROL);
    let conn = connect(&broker, ConnectionConfig::default()).unwrap();
    assert_eq!(conn.state(), LinkState::Connected);
    // Publishing still works on a connected link.
    assert!(conn.publish(STATUS, "stopped").is_ok());
}

#[test]
fn extra_subscription_rejection_is_reported() {
    let h = Harness::start();
    h.broker.reject_topic("unity/forbidden");
    assert_eq!(
        h.connection.subscribe("unity/forbidden"),
        Err(SubscriptionError::Rejected)
    );
}

// ── Publish ───────────────────────────────────────────────────

#[test]
fn publish_uses_exactly_once_without_retain() {
    let h = Harness::start();
    h.connection.publish(STATUS, "moving forward").unwrap();
    let msg = h.broker.published().pop().unwrap();
    assert_eq!(msg.topic, STATUS);
    assert_eq!(msg.payload_str(), "moving forward");
    assert_eq!(msg.qos, beltctl::broker::QoS::ExactlyOnce);
    assert!(!msg.retain);
}

#[test]
fn publish_while_disconnected_is_a_reported_error() {
    let h = Harness::start();
    h.broker.drop_connections();
    assert_eq!(h.connection.state(), LinkState::Disconnected);
    assert_eq!(
        h.connection.publish(STATUS, "stopped"),
        Err(PublishError::NotConnected)
    );
    assert_eq!(
        h.connection.subscribe("unity/other"),
        Err(SubscriptionError::NotConnected)
    );
    assert!(h.broker.published().is_empty());
}

#[test]
fn status_publish_failure_does_not_block_the_command() {
    let mut h = Harness::start();
    h.send("stop");
    h.broker.drop_connections();
    h.service.tick(0.02);
    assert!(!h.service.belt().is_running());
    assert!(h.status_reports().is_empty());
}

// ── Reconnect policy ──────────────────────────────────────────

#[test]
fn transport_relink_is_ignored_by_default() {
    let h = Harness::start();
    h.broker.drop_connections();
    h.broker.restore_connections();
    assert_eq!(h.connection.state(), LinkState::Disconnected);
    assert_eq!(
        h.connection.publish(STATUS, "stopped"),
        Err(PublishError::NotConnected)
    );
}

#[test]
fn auto_reconnect_resubscribes_the_control_topic() {
    let mut config = ControllerConfig::default();
    config.broker.auto_reconnect = true;
    let mut h = Harness::start_with(config);

    h.broker.drop_connections();
    h.send("stop");
    assert_eq!(h.service.pending(), 0, "nothing delivered while down");

    h.broker.restore_connections();
    assert_eq!(h.connection.state(), LinkState::Ready);
    h.send("stop");
    h.service.tick(0.02);
    assert!(!h.service.belt().is_running());
    assert_eq!(h.status_reports(), vec!["stopped"]);
}

#[test]
fn relinks_during_concurrent_publishes_settle_ready() {
    let mut config = ControllerConfig::default();
    config.broker.auto_reconnect = true;
    let mut h = Harness::start_with(config);

    let broker = h.broker.clone();
    let flapper = std::thread::spawn(move || {
        for _ in 0..200 {
            broker.drop_connections();
            broker.restore_connections();
        }
    });
    for _ in 0..200 {
        // Errors are expected while the link is down; only liveness matters.
        let _ = h.connection.publish(STATUS, "moving forward");
    }
    flapper.join().unwrap();

    h.service.tick(0.02);
    assert_eq!(h.connection.state(), LinkState::Ready);
    h.send("stop");
    h.service.tick(0.02);
    assert!(!h.service.belt().is_running());
}
