//! Track descriptions shared between the relay core and the transport engine

use std::fmt;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Codec parameters a local track must carry to be re-publishable
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodecCapability {
    /// MIME type (e.g. "video/VP8")
    pub mime_type: String,
    /// RTP clock rate
    pub clock_rate: u32,
    /// Channel count (audio only, 0 otherwise)
    pub channels: u16,
    /// fmtp line from SDP
    pub sdp_fmtp_line: String,
}

impl CodecCapability {
    /// Create a capability with only MIME type and clock rate set
    pub fn new(mime_type: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            mime_type: mime_type.into(),
            clock_rate,
            ..Default::default()
        }
    }
}

/// Identity of a media track
///
/// For a remote track, `ssrc` is the sender's SSRC and is the target of
/// keyframe requests sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Track id
    pub id: String,
    /// Media stream id the track is grouped under
    pub stream_id: String,
    /// Media kind
    pub kind: TrackKind,
    /// Synchronization source
    pub ssrc: u32,
    /// Codec capability
    pub codec: CodecCapability,
}

impl TrackInfo {
    /// Create a new track description
    pub fn new(
        id: impl Into<String>,
        stream_id: impl Into<String>,
        kind: TrackKind,
        ssrc: u32,
        codec: CodecCapability,
    ) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            ssrc,
            codec,
        }
    }

    /// Check if this is a video track
    pub fn is_video(&self) -> bool {
        self.kind == TrackKind::Video
    }
}
