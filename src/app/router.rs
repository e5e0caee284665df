//! Command router — runs on the broker's callback task.
//!
//! Filters inbound messages down to the control topic, decodes the payload
//! and enqueues one [`PendingAction`] per message.  The router never touches
//! the belt: the action is a closure over the decoded [`Command`] that the
//! control loop runs when it drains the queue.
//!
//! ```text
//!  MQTT task                          │ control thread
//!  on_message(topic, payload)         │
//!    └─ decode ─▶ enqueue(action) ────┼──▶ drain ─▶ action(ctx)
//!                                     │               ├─ belt.move_* / stop
//!                                     │               └─ publish status
//! ```
//!
//! Messages from one connection arrive in order on one task, so enqueue
//! order — and therefore apply order — matches broker delivery order.

use std::sync::Arc;

use log::{debug, error};

use crate::config::Topics;
use crate::dispatch::DispatchQueue;
use crate::error::DispatchError;

use super::commands::Command;
use super::ports::MessageHandler;
use super::service::ControlContext;

/// Deferred work for the control thread.
pub type PendingAction = Box<dyn FnOnce(&mut ControlContext<'_>) + Send>;

/// The queue carrying [`PendingAction`]s.
pub type ActionQueue = DispatchQueue<PendingAction>;

/// Maps control-topic messages to queued belt operations.
pub struct CommandRouter {
    control_topic: String,
    status_topic: String,
    queue: Arc<ActionQueue>,
}

impl CommandRouter {
    pub fn new(topics: &Topics, queue: Arc<ActionQueue>) -> Self {
        Self {
            control_topic: topics.control.clone(),
            status_topic: topics.status.clone(),
            queue,
        }
    }

    /// Route one inbound message.
    ///
    /// Returns `Ok(None)` for foreign topics, `Ok(Some(cmd))` once the action
    /// is queued.
    pub fn route(&self, topic: &str, payload: &[u8]) -> Result<Option<Command>, DispatchError> {
        if topic != self.control_topic {
            debug!("Router: ignoring message on '{}'", topic);
            return Ok(None);
        }
        let command = Command::decode(payload);
        self.queue
            .enqueue(command_action(command.clone(), self.status_topic.clone()))?;
        debug!("Router: queued {:?} ({} pending)", command, self.queue.len());
        Ok(Some(command))
    }
}

impl MessageHandler for CommandRouter {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        if let Err(e) = self.route(topic, payload) {
            error!(
                "Router: command '{}' dropped — {}",
                String::from_utf8_lossy(payload).trim(),
                e
            );
        }
    }
}

/// Apply `command` to the belt, then report the outcome on `status_topic`.
fn command_action(command: Command, status_topic: String) -> PendingAction {
    Box::new(move |ctx: &mut ControlContext<'_>| {
        let report = ctx.apply(&command);
        // The publisher logs its own failures; nothing to retry here.
        if ctx.publisher.publish(&status_topic, &report.to_string()).is_err() {
            debug!("Router: status '{}' not delivered", report);
        }
    })
}
