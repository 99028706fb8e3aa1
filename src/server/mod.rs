//! WHIP signaling server
//!
//! This module provides:
//! - Configuration (`BridgeConfig`)
//! - The session lifecycle controller
//! - HTTP routes and the listener serving them

pub mod config;
pub mod controller;
pub mod http;
pub mod listener;

pub use config::{BridgeConfig, IceServerConfig, SinkConfig, WebRtcConfig};
pub use controller::{Controller, SessionAnswer};
pub use listener::WhipServer;
