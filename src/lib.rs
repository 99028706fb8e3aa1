//! WHIP signaling and relay bridge
//!
//! Accepts WHIP-style publish and subscribe sessions over HTTP and relays
//! every published track to any number of subscribers, and optionally to an
//! external distribution sink.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use whip_bridge::server::{BridgeConfig, Controller, WhipServer};
//! use whip_bridge::sink::SinkPool;
//! use whip_bridge::transport::TransportFactory;
//!
//! # async fn run(factory: Arc<dyn TransportFactory>) -> whip_bridge::Result<()> {
//! let controller = Controller::new(BridgeConfig::default(), factory, SinkPool::disabled());
//! WhipServer::new(controller).run().await
//! # }
//! ```
//!
//! The transport engine is a collaborator behind [`transport::TransportFactory`];
//! the `webrtc` feature provides one backed by the `webrtc` crate.

pub mod error;
pub mod media;
pub mod registry;
pub mod server;
pub mod session;
pub mod sink;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use registry::{SessionRegistry, StreamKey};
pub use server::{BridgeConfig, Controller, WhipServer};
pub use session::{ResourceId, SessionMode};
