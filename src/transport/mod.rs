//! Real-time transport engine contract
//!
//! ICE, DTLS, SRTP and codec handling live in an external engine. The bridge
//! only needs offer/answer negotiation, candidate application, track send and
//! receive primitives, and a way to learn about inbound tracks and connection
//! state changes.
//!
//! Engine callbacks are not invoked on the bridge directly. Every transport
//! hands back a channel of [`TransportEvent`]s when it is created, and the
//! session that owns the transport drains that channel on its own task:
//!
//! ```text
//!   engine callback ──► TransportEvent ──► mpsc ──► session event task
//!                                                    ├─ Track        → relay loop
//!                                                    └─ StateChanged → connect / teardown
//! ```

pub mod rtcp;
pub mod track;

#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "webrtc")]
pub mod webrtc;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use rtcp::RtcpPacket;
pub use track::{CodecCapability, TrackInfo, TrackKind};

/// Error reported by the transport engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport or track has been closed
    #[error("transport closed")]
    Closed,
    /// Offer/answer or ICE gathering failed
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    /// Any other engine failure
    #[error("transport engine error: {0}")]
    Engine(String),
}

/// Peer connection state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, nothing happened yet
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media can flow
    Connected,
    /// Connectivity lost
    Disconnected,
    /// Connectivity checks failed
    Failed,
    /// Closed locally or remotely
    Closed,
}

impl ConnectionState {
    /// States after which the session must be torn down
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Events emitted by a transport
pub enum TransportEvent {
    /// The remote peer started sending a track
    Track(Arc<dyn RemoteTrack>),
    /// Connection state changed
    StateChanged(ConnectionState),
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::Track(track) => f.debug_tuple("Track").field(track.info()).finish(),
            TransportEvent::StateChanged(state) => {
                f.debug_tuple("StateChanged").field(state).finish()
            }
        }
    }
}

/// Inbound media track
#[async_trait]
pub trait RemoteTrack: Send + Sync {
    /// Track identity
    fn info(&self) -> &TrackInfo;

    /// Read one RTP packet into `buf`, returning its length
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// Locally owned track that can be attached to any number of transports
///
/// Everything written to it is sent to every transport it was added to.
#[async_trait]
pub trait LocalTrack: Send + Sync {
    /// Track identity (copied from the remote track it republishes)
    fn info(&self) -> &TrackInfo;

    /// Write one RTP packet
    async fn write(&self, packet: &[u8]) -> Result<usize, TransportError>;

    /// Concrete track, for engines adding their own tracks to transports
    fn as_any(&self) -> &dyn Any;
}

/// Source of RTCP feedback from a downstream consumer of a local track
#[async_trait]
pub trait FeedbackReader: Send {
    /// Wait for the next batch of packets received together
    async fn read_batch(&mut self) -> Result<Vec<RtcpPacket>, TransportError>;
}

/// One negotiated peer connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Apply a remote offer and return the local answer
    ///
    /// Resolves only once ICE gathering is complete, so the answer carries
    /// every local candidate. The transport is closed on failure.
    async fn answer(&self, offer_sdp: &str) -> Result<String, TransportError>;

    /// Apply a trickled remote candidate
    async fn add_ice_candidate(&self, candidate: &str) -> Result<(), TransportError>;

    /// Send a local track to the peer
    ///
    /// Returns the feedback the peer sends about that track.
    async fn add_track(
        &self,
        track: Arc<dyn LocalTrack>,
    ) -> Result<Box<dyn FeedbackReader>, TransportError>;

    /// Send RTCP packets to the peer
    async fn write_rtcp(&self, packets: &[RtcpPacket]) -> Result<(), TransportError>;

    /// Close the connection; closing twice is harmless
    async fn close(&self) -> Result<(), TransportError>;
}

/// Receiver half of a transport's event channel
pub type TransportEvents = mpsc::Receiver<TransportEvent>;

/// Constructs transports and local tracks
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a new transport and the channel its events arrive on
    async fn create(&self) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError>;

    /// Create a local track carrying the same codec, id and stream id
    fn local_track(&self, info: &TrackInfo) -> Result<Arc<dyn LocalTrack>, TransportError>;
}
