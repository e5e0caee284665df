//! Control service — the hexagonal core.
//!
//! [`ControlService`] owns the belt, the physics port and the consumer end
//! of the dispatch queue.  Everything that mutates belt state runs inside
//! [`ControlService::tick`] on the control thread.
//!
//! ```text
//!  CommandRouter ──▶ ActionQueue ──▶ ┌───────────────────────┐ ──▶ BodyPort
//!   (MQTT task)                      │    ControlService     │
//!  contact events ─────────────────▶ │  Belt · Heartbeat     │ ──▶ Publisher
//!                                    └───────────────────────┘
//! ```
//!
//! Per tick: finish any deferred link work, drain queued actions (FIFO),
//! then move the belt, then let the heartbeat fire.

use std::sync::Arc;

use log::{info, warn};

use crate::belt::contacts::BodyId;
use crate::belt::{Belt, BeltState};
use crate::broker::{BrokerConnection, BrokerConnector};
use crate::config::{BeltConfig, ControllerConfig};
use crate::dispatch::DispatchQueue;
use crate::heartbeat::Heartbeat;

use super::commands::Command;
use super::events::StatusReport;
use super::ports::{BodyPort, Publisher};
use super::router::{ActionQueue, CommandRouter};

// ───────────────────────────────────────────────────────────────
// ControlContext
// ───────────────────────────────────────────────────────────────

/// What a queued action may touch while it runs on the control thread.
pub struct ControlContext<'a> {
    pub belt: &'a mut Belt,
    pub bodies: &'a mut dyn BodyPort,
    pub publisher: &'a dyn Publisher,
}

impl ControlContext<'_> {
    /// Apply `command` to the belt and return the status to report.
    /// Unknown commands leave the belt untouched.
    pub fn apply(&mut self, command: &Command) -> StatusReport {
        match command {
            Command::Stop => self.belt.stop(),
            Command::MoveForward => self.belt.move_forward(&mut *self.bodies),
            Command::MoveBackward => self.belt.move_backward(&mut *self.bodies),
            Command::Unknown(raw) => warn!("Control: unknown command '{}'", raw),
        }
        command.status()
    }
}

// ───────────────────────────────────────────────────────────────
// ControlService
// ───────────────────────────────────────────────────────────────

pub struct ControlService<B> {
    belt: Belt,
    bodies: B,
    publisher: Arc<dyn Publisher>,
    queue: Arc<ActionQueue>,
    heartbeat: Heartbeat,
    tick_count: u64,
    actions_applied: u64,
}

impl<B: BodyPort> ControlService<B> {
    /// Assemble the service around an existing queue and publisher.
    ///
    /// The heartbeat starts disabled; see [`with_heartbeat`](Self::with_heartbeat).
    pub fn new(
        config: BeltConfig,
        bodies: B,
        publisher: Arc<dyn Publisher>,
        queue: Arc<ActionQueue>,
    ) -> Self {
        Self {
            belt: Belt::new(config),
            bodies,
            publisher,
            queue,
            heartbeat: Heartbeat::disabled(),
            tick_count: 0,
            actions_applied: 0,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Validate `config`, open the broker session with a [`CommandRouter`]
    /// on the control topic, and build the service around it.
    ///
    /// The returned connection is also the service's publisher; share it
    /// with sensor zones.
    pub fn start<K>(
        connector: &mut K,
        config: &ControllerConfig,
        bodies: B,
    ) -> crate::Result<(Self, Arc<BrokerConnection<K::Client>>)>
    where
        K: BrokerConnector,
    {
        config.validate()?;

        let queue: Arc<ActionQueue> = Arc::new(DispatchQueue::new());
        let router = Arc::new(CommandRouter::new(&config.topics, Arc::clone(&queue)));
        let connection = Arc::new(BrokerConnection::connect(
            connector,
            config.broker.clone(),
            &config.topics.control,
            router,
        )?);
        info!(
            "Control: started as '{}' (control='{}', status='{}')",
            connection.client_id(),
            config.topics.control,
            config.topics.status
        );

        let publisher: Arc<dyn Publisher> = connection.clone();
        let service = Self::new(config.belt.clone(), bodies, publisher, queue)
            .with_heartbeat(Heartbeat::new(config.heartbeat.clone()));
        Ok((service, connection))
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control step: link housekeeping, apply queued actions, move
    /// contacts, heartbeat.
    ///
    /// Returns the number of actions applied.
    pub fn tick(&mut self, dt_secs: f32) -> usize {
        self.tick_count += 1;
        self.publisher.poll();

        let Self {
            belt,
            bodies,
            publisher,
            queue,
            ..
        } = self;
        let applied = queue.drain(|action| {
            let mut ctx = ControlContext {
                belt: &mut *belt,
                bodies: &mut *bodies,
                publisher: &**publisher,
            };
            action(&mut ctx);
        });
        self.actions_applied += applied as u64;

        self.belt.tick(dt_secs, &mut self.bodies);
        self.heartbeat.tick(dt_secs, &*self.publisher);
        applied
    }

    // ── Contact events (physics callbacks, control thread) ────

    pub fn on_contact_begin(&mut self, body: BodyId) -> bool {
        self.belt.on_contact_begin(body)
    }

    pub fn on_contact_end(&mut self, body: BodyId) -> bool {
        self.belt.on_contact_end(body)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn belt(&self) -> &Belt {
        &self.belt
    }

    pub fn state(&self) -> BeltState {
        self.belt.state()
    }

    pub fn bodies(&self) -> &B {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut B {
        &mut self.bodies
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    /// Producer handle for the dispatch queue.
    pub fn queue(&self) -> &Arc<ActionQueue> {
        &self.queue
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn actions_applied(&self) -> u64 {
        self.actions_applied
    }
}
