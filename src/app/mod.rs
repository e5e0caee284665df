//! Application core — command decoding, routing and the control loop.
//!
//! Everything here is free of transport and engine types.  The physics
//! engine, the visual layer and the broker are reached only through the
//! **port traits** in [`ports`], so the whole control path runs on the host
//! against fakes.

pub mod commands;
pub mod events;
pub mod ports;
pub mod router;
pub mod service;
