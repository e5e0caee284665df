//! Periodic heartbeat publisher.
//!
//! Publishes a fixed payload to a fixed topic every `interval_secs` of
//! accumulated control time.  Ticks while the link is down are skipped
//! rather than queued, so a reconnect never produces a burst.
//!
//! The default payload is `fwd` on the control topic, which keeps a
//! remote belt running as long as this controller is alive.

use log::{debug, info};

use crate::app::ports::Publisher;
use crate::config::HeartbeatConfig;

/// Outcome of one [`Heartbeat::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// Interval not yet elapsed (or heartbeat disabled).
    Idle,
    /// Payload handed to the publisher.
    Sent,
    /// Interval elapsed but the link was down or the publish failed.
    Skipped,
}

pub struct Heartbeat {
    config: HeartbeatConfig,
    elapsed_secs: f32,
    sent: u64,
    skipped: u64,
}

impl Heartbeat {
    pub fn new(config: HeartbeatConfig) -> Self {
        if config.enabled {
            info!(
                "Heartbeat: '{}' -> {} every {:.1}s",
                config.payload, config.topic, config.interval_secs
            );
        }
        Self {
            config,
            elapsed_secs: 0.0,
            sent: 0,
            skipped: 0,
        }
    }

    /// A heartbeat that never fires.
    pub fn disabled() -> Self {
        Self::new(HeartbeatConfig {
            enabled: false,
            ..HeartbeatConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Advance by `dt_secs`; publish once if the interval has elapsed.
    ///
    /// At most one beat per call, however large `dt_secs` is.
    pub fn tick(&mut self, dt_secs: f32, publisher: &dyn Publisher) -> Beat {
        if !self.config.enabled || !dt_secs.is_finite() || dt_secs <= 0.0 {
            return Beat::Idle;
        }
        self.elapsed_secs += dt_secs;
        if self.elapsed_secs < self.config.interval_secs {
            return Beat::Idle;
        }
        self.elapsed_secs = 0.0;

        if !publisher.is_connected() {
            self.skipped += 1;
            debug!("Heartbeat: link down, skipping beat #{}", self.skipped);
            return Beat::Skipped;
        }
        match publisher.publish(&self.config.topic, &self.config.payload) {
            Ok(()) => {
                self.sent += 1;
                Beat::Sent
            }
            Err(_) => {
                self.skipped += 1;
                Beat::Skipped
            }
        }
    }
}
