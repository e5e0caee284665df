//! Port traits — the hexagonal boundary between the control core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControlService (domain)
//! ```
//!
//! The physics engine, the visual layer and the broker implement these
//! traits.  The core consumes them via generics or trait objects and never
//! names a concrete engine type.
//!
//! ## Threading
//!
//! - [`BodyPort`] and [`IndicatorPort`] are only called on the control thread.
//! - [`MessageHandler`] is called on the broker's callback task and must not
//!   touch belt state; it may only enqueue.
//! - [`Publisher`] may be called from either side.

use crate::belt::Vec3;
use crate::belt::contacts::BodyId;
use crate::error::PublishError;

// ───────────────────────────────────────────────────────────────
// Physics port (driven adapter: domain → physics engine)
// ───────────────────────────────────────────────────────────────

/// Motion primitives of the physics collaborator.
pub trait BodyPort {
    /// Move `body` by `delta` in world space on the next physics step.
    fn displace(&mut self, body: BodyId, delta: Vec3);

    /// Keep `body` out of the engine's sleep/idle state.
    fn wake(&mut self, body: BodyId);
}

// ───────────────────────────────────────────────────────────────
// Visual port (driven adapter: domain → indicator)
// ───────────────────────────────────────────────────────────────

/// A binary indicator such as a sensor LED.
pub trait IndicatorPort {
    fn set_lit(&mut self, lit: bool);
}

/// Indicator that does nothing — for sensor zones without a visual.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl IndicatorPort for NoIndicator {
    fn set_lit(&mut self, _lit: bool) {}
}

// ───────────────────────────────────────────────────────────────
// Broker ports
// ───────────────────────────────────────────────────────────────

/// Outbound text publish.  Implemented by
/// [`BrokerConnection`](crate::broker::BrokerConnection).
///
/// Failures are returned per call and are never fatal to the caller.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;

    /// Whether the link can currently carry publishes.
    fn is_connected(&self) -> bool;

    /// Link housekeeping deferred from the transport task.  Called by the
    /// control loop once per tick.
    fn poll(&self) {}
}

/// Receives inbound broker messages on the broker's callback task.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, topic: &str, payload: &[u8]);
}
