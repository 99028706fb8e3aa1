//! Bridge configuration
//!
//! Loaded from a TOML file and/or built in code with the builder methods.
//! Every field has a default, so an empty file is a valid configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default signaling address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Default packet read buffer, one MTU
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1500;

/// Bridge configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the signaling server binds to
    pub bind_addr: SocketAddr,

    /// TLS certificate (PEM); TLS is terminated in front of the bridge
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    pub tls_key: Option<PathBuf>,

    /// Period of the keyframe heartbeat on relayed video tracks
    #[serde(with = "secs")]
    pub keyframe_interval: Duration,

    /// Delay before a connected subscriber asks its publishers for keyframes
    #[serde(with = "secs")]
    pub subscriber_keyframe_delay: Duration,

    /// Relay read buffer size
    pub read_buffer_size: usize,

    /// Capacity of each session's transport event channel
    pub event_channel_capacity: usize,

    /// Transport engine settings
    pub webrtc: WebRtcConfig,

    /// Distribution sink, if any
    pub sink: Option<SinkConfig>,
}

/// Transport engine settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// Multiplex every session on this one UDP port
    pub single_port: Option<u16>,

    /// Ephemeral UDP port range `[min, max]`
    pub port_range: Option<(u16, u16)>,

    /// STUN/TURN servers
    pub ice_servers: Vec<IceServerConfig>,

    /// Run as an ICE-lite agent
    pub ice_lite: bool,

    /// Public addresses announced in place of host candidates
    pub nat_1to1_ips: Vec<IpAddr>,
}

/// One STUN/TURN server
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IceServerConfig {
    /// Server URLs, e.g. `stun:stun.l.google.com:19302`
    pub urls: Vec<String>,
    /// TURN username
    pub username: String,
    /// TURN credential
    pub credential: String,
}

/// Connection settings for a distribution sink
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SinkConfig {
    /// Sink endpoint
    pub host: String,
    /// API key
    pub api_key: String,
    /// API secret
    pub api_secret: String,
    /// Identity the bridge joins rooms as
    #[serde(default = "default_sink_identity")]
    pub identity: String,
}

fn default_sink_identity() -> String {
    "whip-bridge".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            tls_cert: None,
            tls_key: None,
            keyframe_interval: Duration::from_secs(3),
            subscriber_keyframe_delay: Duration::from_secs(1),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            event_channel_capacity: 64,
            webrtc: WebRtcConfig::default(),
            sink: None,
        }
    }
}

impl BridgeConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read_buffer_size must be positive".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Config(
                "event_channel_capacity must be positive".into(),
            ));
        }
        if self.keyframe_interval.is_zero() {
            return Err(Error::Config("keyframe_interval must be positive".into()));
        }
        if let Some((min, max)) = self.webrtc.port_range {
            if min > max {
                return Err(Error::Config(format!("invalid port range {min}-{max}")));
            }
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(Error::Config(
                "tls_cert and tls_key must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the TLS certificate and key
    pub fn tls(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.tls_cert = Some(cert.into());
        self.tls_key = Some(key.into());
        self
    }

    /// Set the keyframe heartbeat period
    pub fn keyframe_interval(mut self, interval: Duration) -> Self {
        self.keyframe_interval = interval;
        self
    }

    /// Set the subscriber keyframe request delay
    pub fn subscriber_keyframe_delay(mut self, delay: Duration) -> Self {
        self.subscriber_keyframe_delay = delay;
        self
    }

    /// Set the relay read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Configure a distribution sink
    pub fn sink(mut self, sink: SinkConfig) -> Self {
        self.sink = Some(sink);
        self
    }
}

/// Durations written as (possibly fractional) seconds
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();

        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.keyframe_interval, Duration::from_secs(3));
        assert_eq!(config.subscriber_keyframe_delay, Duration::from_secs(1));
        assert_eq!(config.read_buffer_size, 1500);
        assert_eq!(config.event_channel_capacity, 64);
        assert!(config.sink.is_none());
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = BridgeConfig::from_toml_str("").unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.webrtc.ice_servers.is_empty());
    }

    #[test]
    fn test_full_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            bind_addr = "127.0.0.1:9443"
            tls_cert = "cert.pem"
            tls_key = "key.pem"
            keyframe_interval = 2.5
            subscriber_keyframe_delay = 0.5

            [webrtc]
            single_port = 8443
            ice_lite = true
            nat_1to1_ips = ["203.0.113.7"]

            [[webrtc.ice_servers]]
            urls = ["stun:stun.l.google.com:19302"]

            [sink]
            host = "wss://sfu.example.com"
            api_key = "key"
            api_secret = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9443);
        assert_eq!(config.tls_cert, Some(PathBuf::from("cert.pem")));
        assert_eq!(config.keyframe_interval, Duration::from_millis(2500));
        assert_eq!(config.subscriber_keyframe_delay, Duration::from_millis(500));
        assert_eq!(config.webrtc.single_port, Some(8443));
        assert!(config.webrtc.ice_lite);
        assert_eq!(
            config.webrtc.nat_1to1_ips,
            vec!["203.0.113.7".parse::<IpAddr>().unwrap()]
        );
        assert_eq!(
            config.webrtc.ice_servers[0].urls,
            vec!["stun:stun.l.google.com:19302".to_string()]
        );

        let sink = config.sink.unwrap();
        assert_eq!(sink.host, "wss://sfu.example.com");
        assert_eq!(sink.identity, "whip-bridge");
    }

    #[test]
    fn test_invalid_toml() {
        let err = BridgeConfig::from_toml_str("bind_addr = 12").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation() {
        let err = BridgeConfig::from_toml_str("read_buffer_size = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = BridgeConfig::from_toml_str("[webrtc]\nport_range = [6000, 5000]").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = BridgeConfig::from_toml_str(r#"tls_cert = "cert.pem""#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = BridgeConfig::load("/nonexistent/whip-bridge.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = BridgeConfig::default()
            .bind(addr)
            .tls("cert.pem", "key.pem")
            .keyframe_interval(Duration::from_secs(5))
            .subscriber_keyframe_delay(Duration::from_millis(200))
            .read_buffer_size(1200);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.tls_key, Some(PathBuf::from("key.pem")));
        assert_eq!(config.keyframe_interval, Duration::from_secs(5));
        assert_eq!(config.subscriber_keyframe_delay, Duration::from_millis(200));
        assert_eq!(config.read_buffer_size, 1200);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = BridgeConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9000);
    }
}
