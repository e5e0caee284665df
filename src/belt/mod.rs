//! Conveyor belt actuator state machine.
//!
//! ```text
//!            move_forward / move_backward
//!   ┌─────────┐ ────────────────────────▶ ┌──────────────────┐
//!   │ Stopped │                           │ Running(direction)│──┐
//!   └─────────┘ ◀──────────────────────── └──────────────────┘  │ move_*
//!                         stop                      ▲            │
//!                                                   └────────────┘
//! ```
//!
//! There is no terminal state; the belt lives as long as the process.
//! Every mutation happens on the control thread, either from a drained
//! dispatch action or from the per-tick [`Belt::tick`].
//!
//! Motion is delegated to the physics collaborator through
//! [`BodyPort`]: while running, every tracked contact is woken and
//! displaced by `direction × speed × dt` each tick.

pub mod contacts;

use core::ops::{Add, Mul};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::app::ports::BodyPort;
use crate::config::BeltConfig;
use contacts::{BodyId, ContactSet};

// ---------------------------------------------------------------------------
// Vector
// ---------------------------------------------------------------------------

/// Minimal 3-component vector in the physics collaborator's world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    /// `-X`.
    pub const LEFT: Self = Self::new(-1.0, 0.0, 0.0);
    /// `+X`.
    pub const RIGHT: Self = Self::new(1.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction; the zero vector stays zero.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > f32::EPSILON { self * (1.0 / len) } else { Self::ZERO }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Observable actuator state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeltState {
    /// Moving contacts along the (unit) direction.
    Running(Vec3),
    /// Inert.  The last direction is retained for diagnostics.
    Stopped,
}

// ---------------------------------------------------------------------------
// Belt
// ---------------------------------------------------------------------------

/// The conveyor actuator: run/stop state, direction and the contact set.
pub struct Belt {
    config: BeltConfig,
    direction: Vec3,
    running: bool,
    contacts: ContactSet,
}

impl Belt {
    /// Build the belt in its configured start state (running forward by
    /// default).
    pub fn new(config: BeltConfig) -> Self {
        let direction = config.forward.normalized();
        let running = config.start_running;
        info!(
            "Belt: init {} dir=({:.2}, {:.2}, {:.2}) speed={}",
            if running { "running" } else { "stopped" },
            direction.x,
            direction.y,
            direction.z,
            config.speed
        );
        Self {
            config,
            direction,
            running,
            contacts: ContactSet::new(),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> BeltState {
        if self.running {
            BeltState::Running(self.direction)
        } else {
            BeltState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current (unit) direction, retained while stopped.
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn contacts(&self) -> &ContactSet {
        &self.contacts
    }

    pub fn config(&self) -> &BeltConfig {
        &self.config
    }

    // ── Transitions ───────────────────────────────────────────

    /// Run in the configured forward direction.  Valid from any state.
    pub fn move_forward(&mut self, bodies: &mut (impl BodyPort + ?Sized)) {
        info!("Belt: forward");
        self.run(self.config.forward, bodies);
    }

    /// Run in the configured backward direction.  Valid from any state.
    pub fn move_backward(&mut self, bodies: &mut (impl BodyPort + ?Sized)) {
        info!("Belt: backward");
        self.run(self.config.backward, bodies);
    }

    /// Stop.  The direction is kept but has no effect until the next run.
    pub fn stop(&mut self) {
        info!("Belt: stop");
        self.running = false;
    }

    // ── Contacts ──────────────────────────────────────────────

    pub fn on_contact_begin(&mut self, body: BodyId) -> bool {
        self.contacts.on_contact_begin(body)
    }

    pub fn on_contact_end(&mut self, body: BodyId) -> bool {
        self.contacts.on_contact_end(body)
    }

    // ── Per-tick motion ───────────────────────────────────────

    /// Advance one control step of `dt_secs`.
    ///
    /// Returns the number of bodies displaced (zero while stopped or for a
    /// non-positive / non-finite step).
    pub fn tick(&mut self, dt_secs: f32, bodies: &mut (impl BodyPort + ?Sized)) -> usize {
        if !self.running || !dt_secs.is_finite() || dt_secs <= 0.0 {
            return 0;
        }
        let delta = self.direction * (self.config.speed * dt_secs);
        for body in self.contacts.iter() {
            bodies.wake(body);
            bodies.displace(body, delta);
        }
        self.contacts.len()
    }

    // ── Internal ──────────────────────────────────────────────

    fn run(&mut self, direction: Vec3, bodies: &mut (impl BodyPort + ?Sized)) {
        self.direction = direction.normalized();
        self.running = true;
        self.nudge(bodies);
    }

    /// One-shot push of every resting contact along the new direction.
    ///
    /// A body sitting exactly on a contact boundary when the direction flips
    /// can stop generating contact callbacks; the nudge re-arms detection.
    fn nudge(&self, bodies: &mut (impl BodyPort + ?Sized)) {
        if self.contacts.is_empty() {
            return;
        }
        let delta = self.direction * self.config.nudge_distance;
        for body in self.contacts.iter() {
            bodies.wake(body);
            bodies.displace(body, delta);
        }
        debug!("Belt: nudged {} contact(s)", self.contacts.len());
    }
}
