//! Transport engine backed by the `webrtc` crate
//!
//! Every peer connection gets its own media engine and interceptor registry
//! with a fixed codec set:
//!
//! | Kind  | Codec | Clock | Payload type |
//! |-------|-------|-------|--------------|
//! | audio | PCMA  | 8000  | 8            |
//! | audio | Opus  | 48000 | 111          |
//! | video | VP8   | 90000 | 96           |
//! | video | H.264 | 90000 | 102          |
//!
//! Video codecs advertise `goog-remb`, `ccm fir`, `nack` and `nack pli`.
//! Each connection accepts one inbound audio and one inbound video track.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{
    MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_PCMA, MIME_TYPE_VP8,
};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::ice::udp_mux::{UDPMuxDefault, UDPMuxParams};
use webrtc::ice::udp_network::{EphemeralUDP, UDPNetwork};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::packet::Packet as RtcpWirePacket;
use webrtc::rtcp::payload_feedbacks::full_intra_request::{FirEntry, FullIntraRequest};
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use webrtc::rtcp::receiver_report::ReceiverReport;
use webrtc::rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCPFeedback, RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;
use webrtc::util::marshal::Marshal;

use crate::server::config::WebRtcConfig;

use super::{
    CodecCapability, ConnectionState, FeedbackReader, LocalTrack, RemoteTrack, RtcpPacket,
    TrackInfo, TrackKind, Transport, TransportError, TransportEvent, TransportEvents,
    TransportFactory,
};

const OPUS_FMTP: &str = "minptime=10;useinbandfec=1";
const H264_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42001f";

fn engine_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Engine(e.to_string())
}

fn negotiation_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Negotiation(e.to_string())
}

/// Factory for `webrtc`-crate peer connections
pub struct WebRtcFactory {
    settings: SettingEngine,
    ice_servers: Vec<RTCIceServer>,
    event_capacity: usize,
}

impl WebRtcFactory {
    /// Build the shared engine settings
    ///
    /// Binds the single UDP port when one is configured.
    pub async fn new(config: &WebRtcConfig, event_capacity: usize) -> Result<Self, TransportError> {
        let mut settings = SettingEngine::default();

        if let Some(port) = config.single_port {
            let socket = tokio::net::UdpSocket::bind(("0.0.0.0", port))
                .await
                .map_err(engine_error)?;
            tracing::info!(port = port, "ICE listening on single UDP port");
            settings.set_udp_network(UDPNetwork::Muxed(UDPMuxDefault::new(
                UDPMuxParams::new(socket),
            )));
        } else if let Some((min, max)) = config.port_range {
            let ephemeral = EphemeralUDP::new(min, max).map_err(engine_error)?;
            settings.set_udp_network(UDPNetwork::Ephemeral(ephemeral));
            tracing::info!(min = min, max = max, "ICE UDP port range");
        }

        let ice_servers = if config.ice_lite {
            settings.set_lite(true);
            Vec::new()
        } else {
            config
                .ice_servers
                .iter()
                .map(|s| RTCIceServer {
                    urls: s.urls.clone(),
                    username: s.username.clone(),
                    credential: s.credential.clone(),
                    ..Default::default()
                })
                .collect()
        };

        if !config.nat_1to1_ips.is_empty() {
            settings.set_nat_1to1_ips(
                config.nat_1to1_ips.iter().map(ToString::to_string).collect(),
                RTCIceCandidateType::Host,
            );
        }

        Ok(Self {
            settings,
            ice_servers,
            event_capacity: event_capacity.max(1),
        })
    }

    async fn new_peer_connection(&self) -> Result<Arc<RTCPeerConnection>, webrtc::Error> {
        let mut media = MediaEngine::default();
        register_codecs(&mut media)?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .with_setting_engine(self.settings.clone())
            .build();

        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            bundle_policy: RTCBundlePolicy::Balanced,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await?);

        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            let init = RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: Vec::new(),
            };
            if let Err(e) = pc.add_transceiver_from_kind(kind, Some(init)).await {
                tracing::warn!(kind = %kind, error = %e, "Failed to add receive transceiver");
            }
        }

        Ok(pc)
    }
}

fn register_codecs(media: &mut MediaEngine) -> Result<(), webrtc::Error> {
    let audio = [
        (
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_PCMA.to_owned(),
                clock_rate: 8000,
                ..Default::default()
            },
            8,
        ),
        (
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: OPUS_FMTP.to_owned(),
                rtcp_feedback: Vec::new(),
            },
            111,
        ),
    ];
    for (capability, payload_type) in audio {
        media.register_codec(
            RTCRtpCodecParameters {
                capability,
                payload_type,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )?;
    }

    let video = [
        (MIME_TYPE_VP8, "", 96),
        (MIME_TYPE_H264, H264_FMTP, 102),
    ];
    for (mime_type, fmtp, payload_type) in video {
        media.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: mime_type.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: fmtp.to_owned(),
                    rtcp_feedback: video_rtcp_feedback(),
                },
                payload_type,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;
    }

    Ok(())
}

fn video_rtcp_feedback() -> Vec<RTCPFeedback> {
    [("goog-remb", ""), ("ccm", "fir"), ("nack", ""), ("nack", "pli")]
        .into_iter()
        .map(|(typ, parameter)| RTCPFeedback {
            typ: typ.to_owned(),
            parameter: parameter.to_owned(),
        })
        .collect()
}

#[async_trait]
impl TransportFactory for WebRtcFactory {
    async fn create(&self) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError> {
        let pc = self.new_peer_connection().await.map_err(engine_error)?;
        let (tx, rx) = mpsc::channel(self.event_capacity);

        let track_tx = tx.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                Box::pin(async move {
                    let remote = WebRtcRemoteTrack::new(track);
                    tracing::debug!(
                        track = %remote.info.id,
                        kind = %remote.info.kind,
                        codec = %remote.info.codec.mime_type,
                        "Track has started"
                    );
                    let remote: Arc<dyn RemoteTrack> = Arc::new(remote);
                    let _ = tx.send(TransportEvent::Track(remote)).await;
                })
            },
        ));

        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let tx = tx.clone();
            Box::pin(async move {
                if let Some(state) = connection_state(state) {
                    let _ = tx.send(TransportEvent::StateChanged(state)).await;
                }
            })
        }));

        let transport: Arc<dyn Transport> = Arc::new(WebRtcTransport { pc });
        Ok((transport, rx))
    }

    fn local_track(&self, info: &TrackInfo) -> Result<Arc<dyn LocalTrack>, TransportError> {
        let capability = RTCRtpCodecCapability {
            mime_type: info.codec.mime_type.clone(),
            clock_rate: info.codec.clock_rate,
            channels: info.codec.channels,
            sdp_fmtp_line: info.codec.sdp_fmtp_line.clone(),
            rtcp_feedback: Vec::new(),
        };
        let track = Arc::new(TrackLocalStaticRTP::new(
            capability,
            info.id.clone(),
            info.stream_id.clone(),
        ));

        let track: Arc<dyn LocalTrack> = Arc::new(WebRtcLocalTrack {
            info: info.clone(),
            track,
        });
        Ok(track)
    }
}

fn connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

/// One `RTCPeerConnection`
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcTransport {
    async fn negotiate(&self, offer_sdp: &str) -> Result<String, TransportError> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_owned()).map_err(negotiation_error)?;
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(negotiation_error)?;

        let answer = self.pc.create_answer(None).await.map_err(negotiation_error)?;

        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(answer)
            .await
            .map_err(negotiation_error)?;
        let _ = gather_complete.recv().await;

        self.pc
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .ok_or_else(|| TransportError::Negotiation("no local description".into()))
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
    async fn answer(&self, offer_sdp: &str) -> Result<String, TransportError> {
        let result = self.negotiate(offer_sdp).await;
        if result.is_err() {
            let _ = self.pc.close().await;
        }
        result
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<(), TransportError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.to_owned(),
                sdp_mid: Some("0".to_owned()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            })
            .await
            .map_err(engine_error)
    }

    async fn add_track(
        &self,
        track: Arc<dyn LocalTrack>,
    ) -> Result<Box<dyn FeedbackReader>, TransportError> {
        let local = track
            .as_any()
            .downcast_ref::<WebRtcLocalTrack>()
            .ok_or_else(|| TransportError::Engine("track was not created by this engine".into()))?;

        let sender = self
            .pc
            .add_track(Arc::clone(&local.track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(engine_error)?;

        Ok(Box::new(WebRtcFeedbackReader { sender }))
    }

    async fn write_rtcp(&self, packets: &[RtcpPacket]) -> Result<(), TransportError> {
        let packets: Vec<Box<dyn RtcpWirePacket + Send + Sync>> =
            packets.iter().filter_map(to_wire).collect();
        if packets.is_empty() {
            return Ok(());
        }

        self.pc.write_rtcp(&packets).await.map_err(engine_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc.close().await.map_err(engine_error)
    }
}

/// Inbound `TrackRemote`
pub struct WebRtcRemoteTrack {
    info: TrackInfo,
    track: Arc<TrackRemote>,
}

impl WebRtcRemoteTrack {
    fn new(track: Arc<TrackRemote>) -> Self {
        let codec = track.codec().capability;
        let kind = match track.kind() {
            RTPCodecType::Video => TrackKind::Video,
            _ => TrackKind::Audio,
        };

        let info = TrackInfo::new(
            track.id(),
            track.stream_id(),
            kind,
            track.ssrc(),
            CodecCapability {
                mime_type: codec.mime_type,
                clock_rate: codec.clock_rate,
                channels: codec.channels,
                sdp_fmtp_line: codec.sdp_fmtp_line,
            },
        );

        Self { info, track }
    }
}

#[async_trait]
impl RemoteTrack for WebRtcRemoteTrack {
    fn info(&self) -> &TrackInfo {
        &self.info
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let (packet, _) = self.track.read_rtp().await.map_err(engine_error)?;
        packet.marshal_to(buf).map_err(engine_error)
    }
}

/// `TrackLocalStaticRTP` shared by every subscriber of a track
pub struct WebRtcLocalTrack {
    info: TrackInfo,
    track: Arc<TrackLocalStaticRTP>,
}

#[async_trait]
impl LocalTrack for WebRtcLocalTrack {
    fn info(&self) -> &TrackInfo {
        &self.info
    }

    async fn write(&self, packet: &[u8]) -> Result<usize, TransportError> {
        self.track.write(packet).await.map_err(engine_error)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// RTCP received on one `RTCRtpSender`
pub struct WebRtcFeedbackReader {
    sender: Arc<RTCRtpSender>,
}

#[async_trait]
impl FeedbackReader for WebRtcFeedbackReader {
    async fn read_batch(&mut self) -> Result<Vec<RtcpPacket>, TransportError> {
        let (packets, _) = self.sender.read_rtcp().await.map_err(engine_error)?;
        Ok(packets.iter().map(|p| from_wire(p.as_ref())).collect())
    }
}

fn from_wire(packet: &(dyn RtcpWirePacket + Send + Sync)) -> RtcpPacket {
    let any = packet.as_any();

    if let Some(pli) = any.downcast_ref::<PictureLossIndication>() {
        RtcpPacket::PictureLossIndication {
            media_ssrc: pli.media_ssrc,
        }
    } else if let Some(fir) = any.downcast_ref::<FullIntraRequest>() {
        RtcpPacket::FullIntraRequest {
            media_ssrc: fir.media_ssrc,
            sequence_number: fir.fir.first().map(|e| e.sequence_number).unwrap_or(0),
        }
    } else if let Some(remb) = any.downcast_ref::<ReceiverEstimatedMaximumBitrate>() {
        RtcpPacket::ReceiverEstimatedMaximumBitrate {
            bitrate: remb.bitrate as u64,
        }
    } else if let Some(rr) = any.downcast_ref::<ReceiverReport>() {
        RtcpPacket::ReceiverReport {
            fraction_lost: rr.reports.iter().map(|r| r.fraction_lost).collect(),
        }
    } else if any.downcast_ref::<TransportLayerNack>().is_some() {
        RtcpPacket::TransportLayerNack
    } else {
        RtcpPacket::Other
    }
}

fn to_wire(packet: &RtcpPacket) -> Option<Box<dyn RtcpWirePacket + Send + Sync>> {
    match *packet {
        RtcpPacket::PictureLossIndication { media_ssrc } => Some(Box::new(PictureLossIndication {
            sender_ssrc: 0,
            media_ssrc,
        })),
        RtcpPacket::FullIntraRequest {
            media_ssrc,
            sequence_number,
        } => Some(Box::new(FullIntraRequest {
            sender_ssrc: 0,
            media_ssrc,
            fir: vec![FirEntry {
                ssrc: media_ssrc,
                sequence_number,
            }],
        })),
        _ => None,
    }
}
