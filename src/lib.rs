//! Conveyor controller core.
//!
//! Receives belt commands over MQTT, applies them on a single control
//! thread and reports status and sensor presence back to the broker.
//! Physics, visuals and the host application are external collaborators
//! reached through the port traits in [`app::ports`].
//!
//! The ESP-IDF MQTT transport is guarded by `#[cfg(target_os = "espidf")]`;
//! every other target gets the in-process loopback broker.

#![deny(unused_must_use)]

pub mod app;
pub mod belt;
pub mod broker;
pub mod config;
pub mod dispatch;
pub mod heartbeat;
pub mod sensors;

mod error;

pub use error::{
    ConfigError, ConnectionError, DispatchError, Error, PublishError, Result, SubscriptionError,
};
