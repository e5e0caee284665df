//! Sensor zones — presence events keyed by sensor identity.
//!
//! A [`SensorZone`] receives contact begin/end callbacks from the physics
//! collaborator and publishes `<id>:on` / `<id>:off` to its topic.  This
//! path is independent of the command path: nothing here goes through the
//! dispatch queue, and no ordering against status reports is implied.
//!
//! Publishes are fire-and-forget.  A failure is logged and returned to the
//! caller, never retried.

use core::fmt::Write as _;

use log::{debug, warn};

use crate::app::ports::{IndicatorPort, NoIndicator, Publisher};
use crate::config::SensorZoneConfig;
use crate::error::{ConfigError, PublishError};

/// Longest sensor id that still fits `<id>:off` in the payload buffer.
pub const MAX_SENSOR_ID_LEN: usize = 59;

type Payload = heapless::String<64>;

/// One trigger volume with an identity, a topic and an optional indicator.
pub struct SensorZone<I = NoIndicator> {
    id: String,
    topic: String,
    indicator: I,
    events_published: u64,
}

impl SensorZone<NoIndicator> {
    pub fn new(id: &str, topic: &str) -> Result<Self, ConfigError> {
        Self::with_indicator(id, topic, NoIndicator)
    }

    pub fn from_config(config: &SensorZoneConfig) -> Result<Self, ConfigError> {
        Self::new(&config.id, &config.topic)
    }
}

impl<I: IndicatorPort> SensorZone<I> {
    /// Build a zone driving `indicator`.  The indicator starts dark.
    pub fn with_indicator(id: &str, topic: &str, mut indicator: I) -> Result<Self, ConfigError> {
        if id.is_empty() || id.len() > MAX_SENSOR_ID_LEN || id.contains(':') {
            return Err(ConfigError::Invalid("sensor id must be 1..=59 bytes without ':'"));
        }
        if topic.is_empty() {
            return Err(ConfigError::Invalid("sensor topic must not be empty"));
        }
        indicator.set_lit(false);
        Ok(Self {
            id: id.to_owned(),
            topic: topic.to_owned(),
            indicator,
            events_published: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn events_published(&self) -> u64 {
        self.events_published
    }

    /// A body entered the zone: light up and publish `<id>:on`.
    pub fn on_contact_begin(&mut self, publisher: &dyn Publisher) -> Result<(), PublishError> {
        self.indicator.set_lit(true);
        self.emit("on", publisher)
    }

    /// A body left the zone: go dark and publish `<id>:off`.
    pub fn on_contact_end(&mut self, publisher: &dyn Publisher) -> Result<(), PublishError> {
        self.indicator.set_lit(false);
        self.emit("off", publisher)
    }

    fn emit(&mut self, presence: &str, publisher: &dyn Publisher) -> Result<(), PublishError> {
        let mut payload = Payload::new();
        // Cannot overflow: the id length is bounded at construction.
        let _ = write!(payload, "{}:{}", self.id, presence);

        match publisher.publish(&self.topic, &payload) {
            Ok(()) => {
                self.events_published += 1;
                debug!("Sensor {}: {}", self.id, presence);
                Ok(())
            }
            Err(e) => {
                warn!("Sensor {}: '{}' not published — {}", self.id, payload, e);
                Err(e)
            }
        }
    }
}
