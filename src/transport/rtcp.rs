//! RTCP packets the relay core cares about
//!
//! The transport engine decodes incoming compound packets into these
//! variants. Anything the relay does not inspect is reported as `Other`.

/// A decoded RTCP feedback packet
#[derive(Debug, Clone, PartialEq)]
pub enum RtcpPacket {
    /// Picture loss indication (keyframe request)
    PictureLossIndication {
        /// SSRC of the media the request is about
        media_ssrc: u32,
    },
    /// Full intra request
    FullIntraRequest {
        /// SSRC of the media the request is about
        media_ssrc: u32,
        /// FIR command sequence number
        sequence_number: u8,
    },
    /// Receiver estimated maximum bitrate
    ReceiverEstimatedMaximumBitrate {
        /// Estimated bitrate in bits per second
        bitrate: u64,
    },
    /// Receiver report, reduced to the fraction lost of each report block
    ReceiverReport {
        /// Fraction lost per report block (0..=255, 256ths)
        fraction_lost: Vec<u8>,
    },
    /// Generic NACK
    TransportLayerNack,
    /// Anything else
    Other,
}

impl RtcpPacket {
    /// Build a picture loss indication for a media source
    pub fn pli(media_ssrc: u32) -> Self {
        RtcpPacket::PictureLossIndication { media_ssrc }
    }

    /// Copy of this packet retargeted at another media source
    ///
    /// Only keyframe requests carry a media SSRC; other packets are
    /// returned unchanged.
    pub fn retarget(&self, media_ssrc: u32) -> Self {
        match self {
            RtcpPacket::PictureLossIndication { .. } => {
                RtcpPacket::PictureLossIndication { media_ssrc }
            }
            RtcpPacket::FullIntraRequest {
                sequence_number, ..
            } => RtcpPacket::FullIntraRequest {
                media_ssrc,
                sequence_number: *sequence_number,
            },
            other => other.clone(),
        }
    }
}
