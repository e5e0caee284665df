//! Integration tests for the command router and dispatch queue boundary.

use std::sync::Arc;
use std::thread;

use crate::mock_ports::{CONTROL, Harness, MockBodies};

use beltctl::DispatchError;
use beltctl::app::ports::MessageHandler;
use beltctl::app::router::{ActionQueue, CommandRouter};
use beltctl::app::service::ControlService;
use beltctl::belt::BeltState;
use beltctl::broker::loopback::LoopbackBroker;
use beltctl::broker::{BrokerConnection, ConnectionConfig};
use beltctl::config::{BeltConfig, Topics};
use beltctl::dispatch::DISPATCH_DEPTH;

#[test]
fn foreign_topics_never_reach_the_queue() {
    let h = Harness::start();
    h.connection.subscribe("unity/other").unwrap();
    h.broker.inject("unity/other", b"stop");
    assert_eq!(h.service.pending(), 0);
}

#[test]
fn decode_is_case_and_whitespace_insensitive_end_to_end() {
    let mut h = Harness::start();
    for cmd in ["\tBaCk\n", " Stop", "FWD  "] {
        h.send(cmd);
    }
    h.service.tick(0.02);
    assert_eq!(
        h.status_reports(),
        vec!["moving backward", "stopped", "moving forward"]
    );
}

#[test]
fn full_queue_drops_the_newest_command() {
    let queue = Arc::new(ActionQueue::new());
    let router = CommandRouter::new(&Topics::default(), Arc::clone(&queue));
    for _ in 0..DISPATCH_DEPTH {
        assert!(router.route(CONTROL, b"fwd").is_ok());
    }
    assert_eq!(router.route(CONTROL, b"stop"), Err(DispatchError::Full));

    // The handler entry point logs instead of failing.
    router.on_message(CONTROL, b"stop");
    assert_eq!(queue.len(), DISPATCH_DEPTH);
}

#[test]
fn queued_actions_survive_until_drained() {
    let mut h = Harness::start();
    h.send("stop");
    h.send("back");
    assert_eq!(h.service.tick(0.02), 2);
    assert_eq!(h.service.tick(0.02), 0);
    assert!(matches!(h.service.state(), BeltState::Running(_)));
}

#[test]
fn producers_on_other_threads_are_applied_on_tick() {
    let broker = LoopbackBroker::new();
    let queue = Arc::new(ActionQueue::new());
    let router = Arc::new(CommandRouter::new(&Topics::default(), Arc::clone(&queue)));

    let mut connector = broker.clone();
    let connection = Arc::new(
        BrokerConnection::connect(
            &mut connector,
            ConnectionConfig::default(),
            CONTROL,
            router.clone(),
        )
        .unwrap(),
    );
    let mut service = ControlService::new(
        BeltConfig::default(),
        MockBodies::new(),
        connection.clone(),
        Arc::clone(&queue),
    );

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let router = Arc::clone(&router);
            thread::spawn(move || {
                for _ in 0..8 {
                    assert!(router.route(CONTROL, b"back").unwrap().is_some());
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(service.tick(0.02), 32);
    assert_eq!(
        broker.payloads_on("unity/conveyor/status").len(),
        32,
        "one status per command"
    );
}
