//! Controller configuration
//!
//! All tunable parameters for the conveyor controller.  The host shell
//! builds a [`ControllerConfig`] (defaults, or [`ControllerConfig::from_json`])
//! and hands it to [`ControlService::start`](crate::app::service::ControlService::start).

use serde::{Deserialize, Serialize};

use crate::belt::Vec3;
use crate::broker::ConnectionConfig;
use crate::error::{ConfigError, ConnectionError};
use crate::sensors::MAX_SENSOR_ID_LEN;

/// Topic names used on the control path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topics {
    /// Inbound commands (`stop`, `fwd`, `back`).
    pub control: String,
    /// Outbound status reports.
    pub status: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            control: "unity/conveyor/control".into(),
            status: "unity/conveyor/status".into(),
        }
    }
}

/// Belt kinematics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeltConfig {
    /// Surface speed in world units per second.
    pub speed: f32,
    /// One-shot displacement applied to resting contacts on a direction change.
    pub nudge_distance: f32,
    /// Direction used by `fwd`.
    pub forward: Vec3,
    /// Direction used by `back`.
    pub backward: Vec3,
    /// Whether the belt is running when the controller starts.
    pub start_running: bool,
}

impl Default for BeltConfig {
    fn default() -> Self {
        Self {
            speed: 2.0,
            nudge_distance: 0.001,
            forward: Vec3::LEFT,
            backward: Vec3::RIGHT,
            start_running: true,
        }
    }
}

/// Periodic publish of a fixed payload while the link is up.
///
/// The default sends `fwd` to the controller's own control topic, which
/// makes it a keep-running signal: once enabled, an operator `stop` only
/// holds until the next beat (at most `interval_secs`).  Point `topic` at a
/// separate channel to use the heartbeat as a pure liveness signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Off by default.
    pub enabled: bool,
    pub interval_secs: f32,
    pub topic: String,
    pub payload: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 5.0,
            topic: "unity/conveyor/control".into(),
            payload: "fwd".into(),
        }
    }
}

/// One contact sensor zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorZoneConfig {
    /// Unique sensor identity, used as the payload prefix.
    pub id: String,
    /// Topic presence events are published to.
    pub topic: String,
}

/// Core controller configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub broker: ConnectionConfig,
    pub topics: Topics,
    pub belt: BeltConfig,
    pub heartbeat: HeartbeatConfig,
    pub sensors: Vec<SensorZoneConfig>,
}

impl ControllerConfig {
    /// Parse a JSON document and validate it.  Missing sections take their
    /// defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| {
            log::warn!("Config: parse error at line {} col {}: {}", e.line(), e.column(), e);
            ConfigError::Parse
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Range and consistency checks.  Broker connection settings are
    /// checked again at connect time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.validate().map_err(|e| match e {
            ConnectionError::InvalidConfig(msg) | ConnectionError::Security(msg) => {
                ConfigError::Invalid(msg)
            }
            _ => ConfigError::Invalid("broker settings are invalid"),
        })?;

        validate_topic(&self.topics.control, "topics.control must be a non-empty topic name")?;
        validate_topic(&self.topics.status, "topics.status must be a non-empty topic name")?;
        if self.topics.control == self.topics.status {
            // Status replies would be fed back in as unknown commands.
            return Err(ConfigError::Invalid("topics.status must differ from topics.control"));
        }

        let b = &self.belt;
        if !b.speed.is_finite() || b.speed < 0.0 {
            return Err(ConfigError::Invalid("belt.speed must be finite and >= 0"));
        }
        if !b.nudge_distance.is_finite() || b.nudge_distance < 0.0 {
            return Err(ConfigError::Invalid("belt.nudge_distance must be finite and >= 0"));
        }
        if !b.forward.is_finite() || b.forward.length() <= f32::EPSILON {
            return Err(ConfigError::Invalid("belt.forward must be a non-zero vector"));
        }
        if !b.backward.is_finite() || b.backward.length() <= f32::EPSILON {
            return Err(ConfigError::Invalid("belt.backward must be a non-zero vector"));
        }

        let h = &self.heartbeat;
        if h.enabled {
            if !h.interval_secs.is_finite() || h.interval_secs <= 0.0 {
                return Err(ConfigError::Invalid("heartbeat.interval_secs must be > 0"));
            }
            validate_topic(&h.topic, "heartbeat.topic must be a non-empty topic name")?;
        }

        for (i, s) in self.sensors.iter().enumerate() {
            if s.id.is_empty() || s.id.len() > MAX_SENSOR_ID_LEN || s.id.contains(':') {
                return Err(ConfigError::Invalid("sensors[].id must be 1..=59 bytes without ':'"));
            }
            validate_topic(&s.topic, "sensors[].topic must be a non-empty topic name")?;
            if self.sensors[..i].iter().any(|o| o.id == s.id) {
                return Err(ConfigError::Invalid("sensors[].id must be unique"));
            }
        }
        Ok(())
    }
}

/// Publish/subscribe topic names: non-empty, no wildcards, no NUL.
fn validate_topic(topic: &str, msg: &'static str) -> Result<(), ConfigError> {
    if topic.is_empty() || topic.contains(['+', '#', '\0']) {
        return Err(ConfigError::Invalid(msg));
    }
    Ok(())
}
