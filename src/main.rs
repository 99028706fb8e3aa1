//! WHIP bridge server
//!
//! Run with: cargo run --features webrtc -- [--config bridge.toml] [--addr 0.0.0.0:8080]
//!
//! ## Publishing
//!
//! Point a WHIP client at `http://HOST:8080/whip/publish/{room}/{stream}`.
//!
//! ## Subscribing
//!
//! Post an offer to `http://HOST:8080/whip/subscribe/{room}/{stream}` once
//! the stream is published.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use whip_bridge::server::{BridgeConfig, Controller, WhipServer};
use whip_bridge::sink::SinkPool;
use whip_bridge::transport::webrtc::WebRtcFactory;

/// WHIP signaling and relay bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "WHIP_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides the configuration file)
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// TLS certificate (overrides the configuration file)
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// TLS private key (overrides the configuration file)
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(addr) = args.addr {
        config = config.bind(addr);
    }
    if let (Some(cert), Some(key)) = (args.cert, args.key) {
        config = config.tls(cert, key);
    }
    config.validate()?;

    if config.sink.is_some() {
        tracing::warn!("Sink configured but no sink connector is built in; relaying locally only");
    }

    let factory =
        Arc::new(WebRtcFactory::new(&config.webrtc, config.event_channel_capacity).await?);
    let controller = Controller::new(config, factory, SinkPool::disabled());
    let server = WhipServer::new(controller);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
