//! screenbridge - multi-device Android screen-mirroring and control gateway.
//!
//! Attaches to many ADB-visible devices, spawns a per-device H.264
//! capture agent, frames its raw Annex-B output into NAL units, and fans
//! them out to browser viewers over a single multiplexed WebSocket hub.
//! Viewers post input back through the same socket; the gateway routes
//! it to the originating device's agent.

pub mod adb;
pub mod config;
pub mod control_plane;
pub mod error;
pub mod hub;
pub mod nal;
pub mod state;
pub mod stream;
pub mod utils;
pub mod web;

pub use error::{AppError, Result};
