//! Integration tests for broker → router → queue → belt → status publish.
//!
//! Every command travels the full path: injected on the loopback broker,
//! routed on the "transport" side, applied only when the service ticks.

use crate::mock_ports::{BodyCall, CONTROL, Harness, STATUS};

use beltctl::belt::contacts::BodyId;
use beltctl::belt::{BeltState, Vec3};
use beltctl::config::{ControllerConfig, HeartbeatConfig};

const DT: f32 = 0.02;

fn approx(a: Vec3, b: Vec3) -> bool {
    (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5 && (a.z - b.z).abs() < 1e-5
}

// ── Start state ───────────────────────────────────────────────

#[test]
fn starts_running_forward_with_no_contacts() {
    let h = Harness::start();
    assert_eq!(h.service.state(), BeltState::Running(Vec3::LEFT));
    assert!(h.service.belt().contacts().is_empty());
    assert!(h.status_reports().is_empty());
}

// ── Command scenarios ─────────────────────────────────────────

#[test]
fn fwd_runs_forward_and_reports() {
    let mut h = Harness::start();
    h.send("stop");
    h.service.tick(DT);
    h.send("fwd");
    assert_eq!(h.service.pending(), 1);
    h.service.tick(DT);
    assert_eq!(h.service.state(), BeltState::Running(Vec3::LEFT));
    assert_eq!(h.status_reports(), vec!["stopped", "moving forward"]);
}

#[test]
fn back_runs_backward_and_reports() {
    let mut h = Harness::start();
    h.send("back");
    h.service.tick(DT);
    assert_eq!(h.service.state(), BeltState::Running(Vec3::RIGHT));
    assert_eq!(h.status_reports(), vec!["moving backward"]);
}

#[test]
fn stop_halts_motion_and_reports() {
    let mut h = Harness::start();
    h.service.on_contact_begin(BodyId(7));
    h.send("STOP");
    h.service.tick(DT);
    assert_eq!(h.service.state(), BeltState::Stopped);
    assert_eq!(h.status_reports(), vec!["stopped"]);

    h.service.bodies_mut().clear();
    for _ in 0..10 {
        h.service.tick(DT);
    }
    assert!(h.service.bodies().calls.is_empty(), "stopped belt must not move contacts");
}

#[test]
fn unknown_text_is_echoed_and_state_kept() {
    let mut h = Harness::start();
    h.send("  xyz ");
    h.service.tick(DT);
    assert_eq!(h.service.state(), BeltState::Running(Vec3::LEFT));
    assert_eq!(h.status_reports(), vec!["unknown command: xyz"]);
}

#[test]
fn status_goes_only_to_status_topic() {
    let mut h = Harness::start();
    h.send("fwd");
    h.service.tick(DT);
    let ours: Vec<_> = h
        .broker
        .published()
        .into_iter()
        .filter(|m| m.client_id == h.connection.client_id())
        .collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].topic, STATUS);
    assert!(!ours.iter().any(|m| m.topic == CONTROL));
}

// ── Queue semantics ───────────────────────────────────────────

#[test]
fn nothing_applies_before_tick() {
    let h = Harness::start();
    h.send("stop");
    h.send("back");
    assert_eq!(h.service.state(), BeltState::Running(Vec3::LEFT));
    assert_eq!(h.service.pending(), 2);
    assert!(h.status_reports().is_empty());
}

#[test]
fn commands_apply_in_arrival_order() {
    let mut h = Harness::start();
    for cmd in ["back", "stop", "fwd", "nope", "back"] {
        h.send(cmd);
    }
    assert_eq!(h.service.tick(DT), 5);
    assert_eq!(
        h.status_reports(),
        vec![
            "moving backward",
            "stopped",
            "moving forward",
            "unknown command: nope",
            "moving backward"
        ]
    );
    assert_eq!(h.service.state(), BeltState::Running(Vec3::RIGHT));
    assert_eq!(h.service.actions_applied(), 5);
    assert_eq!(h.service.pending(), 0);
}

// ── Contacts and motion ───────────────────────────────────────

#[test]
fn contacts_ride_the_belt_while_present() {
    let mut h = Harness::start();
    let crate_a = BodyId(1);
    h.service.on_contact_begin(crate_a);
    for _ in 0..50 {
        h.service.tick(DT);
    }
    // 50 × 0.02 s at 2 u/s along -X
    assert!(approx(h.service.bodies().net_displacement(crate_a), Vec3::new(-2.0, 0.0, 0.0)));
    assert!(h.service.bodies().calls.contains(&BodyCall::Wake(crate_a)));

    h.service.on_contact_end(crate_a);
    h.service.bodies_mut().clear();
    h.service.tick(DT);
    assert!(h.service.bodies().calls.is_empty());
}

#[test]
fn direction_change_nudges_resting_contacts() {
    let mut h = Harness::start();
    h.service.on_contact_begin(BodyId(3));
    h.send("back");
    h.service.tick(0.0);
    // Zero-length step: only the nudge moves the body.
    let moves = h.service.bodies().displacements_of(BodyId(3));
    assert_eq!(moves.len(), 1);
    assert!(approx(moves[0], Vec3::new(0.001, 0.0, 0.0)));
}

#[test]
fn duplicate_contact_events_are_tolerated() {
    let mut h = Harness::start();
    assert!(h.service.on_contact_begin(BodyId(9)));
    assert!(!h.service.on_contact_begin(BodyId(9)));
    h.service.tick(DT);
    assert_eq!(h.service.bodies().displacements_of(BodyId(9)).len(), 1);
    assert!(h.service.on_contact_end(BodyId(9)));
    assert!(!h.service.on_contact_end(BodyId(9)));
    assert!(!h.service.on_contact_end(BodyId(42)));
}

// ── Heartbeat ─────────────────────────────────────────────────

#[test]
fn heartbeat_keeps_the_belt_running_through_the_broker() {
    let config = ControllerConfig {
        heartbeat: HeartbeatConfig {
            enabled: true,
            interval_secs: 1.0,
            ..HeartbeatConfig::default()
        },
        ..ControllerConfig::default()
    };
    let mut h = Harness::start_with(config);
    h.send("stop");
    h.service.tick(DT);
    assert_eq!(h.service.state(), BeltState::Stopped);

    // The beat lands on our own control subscription and is applied on the
    // following tick.
    h.service.tick(1.0);
    assert_eq!(h.service.heartbeat().sent(), 1);
    h.service.tick(DT);
    assert_eq!(h.service.state(), BeltState::Running(Vec3::LEFT));
    assert_eq!(h.status_reports(), vec!["stopped", "moving forward"]);
}

#[test]
fn heartbeat_on_its_own_topic_leaves_stop_alone() {
    let config = ControllerConfig {
        heartbeat: HeartbeatConfig {
            enabled: true,
            interval_secs: 1.0,
            topic: "unity/conveyor/alive".into(),
            ..HeartbeatConfig::default()
        },
        ..ControllerConfig::default()
    };
    let mut h = Harness::start_with(config);
    h.send("stop");
    h.service.tick(DT);

    h.service.tick(1.0);
    h.service.tick(DT);
    assert_eq!(h.service.heartbeat().sent(), 1);
    assert_eq!(h.service.state(), BeltState::Stopped);
    assert_eq!(h.broker.payloads_on("unity/conveyor/alive"), vec!["fwd"]);
    assert_eq!(h.status_reports(), vec!["stopped"]);
}

#[test]
fn heartbeat_skips_while_disconnected() {
    let config = ControllerConfig {
        heartbeat: HeartbeatConfig {
            enabled: true,
            interval_secs: 0.5,
            ..HeartbeatConfig::default()
        },
        ..ControllerConfig::default()
    };
    let mut h = Harness::start_with(config);
    h.broker.drop_connections();
    h.service.tick(1.0);
    h.service.tick(1.0);
    assert_eq!(h.service.heartbeat().sent(), 0);
    assert_eq!(h.service.heartbeat().skipped(), 2);
    assert!(h.broker.payloads_on(CONTROL).is_empty());
}
