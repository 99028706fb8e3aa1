//! In-memory transport engine used by unit tests
//!
//! Transports record everything the bridge does to them, and tests drive
//! them by pushing events, media packets and feedback batches.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{
    CodecCapability, ConnectionState, FeedbackReader, LocalTrack, RemoteTrack, RtcpPacket,
    TrackInfo, TrackKind, Transport, TransportError, TransportEvent, TransportEvents,
    TransportFactory,
};

pub(crate) fn video_info(id: &str, ssrc: u32) -> TrackInfo {
    TrackInfo::new(
        id,
        "stream",
        TrackKind::Video,
        ssrc,
        CodecCapability::new("video/VP8", 90000),
    )
}

pub(crate) fn audio_info(id: &str, ssrc: u32) -> TrackInfo {
    let mut codec = CodecCapability::new("audio/opus", 48000);
    codec.channels = 2;
    TrackInfo::new(id, "stream", TrackKind::Audio, ssrc, codec)
}

#[derive(Default)]
pub(crate) struct MockFactory {
    pub transports: Mutex<Vec<Arc<MockTransport>>>,
    pub local_tracks: Mutex<Vec<Arc<MockLocalTrack>>>,
    pub fail_create: AtomicBool,
    pub fail_negotiation: AtomicBool,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        Arc::clone(&self.transports.lock().unwrap()[index])
    }

    pub fn created_track(&self, id: &str) -> Option<Arc<MockLocalTrack>> {
        self.local_tracks
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|t| t.info.id == id)
            .cloned()
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create(&self) -> Result<(Arc<dyn Transport>, TransportEvents), TransportError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TransportError::Engine("no engine".into()));
        }
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(MockTransport {
            events: tx,
            fail_negotiation: self.fail_negotiation.load(Ordering::SeqCst),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            rtcp: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            feedback: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
        });
        self.transports.lock().unwrap().push(Arc::clone(&transport));
        let transport: Arc<dyn Transport> = transport;
        Ok((transport, rx))
    }

    fn local_track(&self, info: &TrackInfo) -> Result<Arc<dyn LocalTrack>, TransportError> {
        let track = Arc::new(MockLocalTrack::new(info.clone()));
        self.local_tracks.lock().unwrap().push(Arc::clone(&track));
        let track: Arc<dyn LocalTrack> = track;
        Ok(track)
    }
}

pub(crate) struct MockTransport {
    events: mpsc::Sender<TransportEvent>,
    fail_negotiation: bool,
    pub closed: AtomicBool,
    pub close_calls: AtomicUsize,
    pub rtcp: Mutex<Vec<RtcpPacket>>,
    pub tracks: Mutex<Vec<Arc<dyn LocalTrack>>>,
    pub feedback: Mutex<Vec<mpsc::UnboundedSender<Vec<RtcpPacket>>>>,
    pub candidates: Mutex<Vec<String>>,
}

impl MockTransport {
    pub async fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event).await;
    }

    pub async fn emit_state(&self, state: ConnectionState) {
        self.emit(TransportEvent::StateChanged(state)).await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn rtcp_sent(&self) -> Vec<RtcpPacket> {
        self.rtcp.lock().unwrap().clone()
    }

    pub fn track_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tracks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.info().id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Deliver a feedback batch on the n-th added track
    pub fn send_feedback(&self, index: usize, batch: Vec<RtcpPacket>) {
        let _ = self.feedback.lock().unwrap()[index].send(batch);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn answer(&self, offer_sdp: &str) -> Result<String, TransportError> {
        if self.fail_negotiation {
            self.closed.store(true, Ordering::SeqCst);
            return Err(TransportError::Negotiation("bad offer".into()));
        }
        Ok(format!("answer-for:{offer_sdp}"))
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<(), TransportError> {
        self.candidates.lock().unwrap().push(candidate.to_string());
        Ok(())
    }

    async fn add_track(
        &self,
        track: Arc<dyn LocalTrack>,
    ) -> Result<Box<dyn FeedbackReader>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tracks.lock().unwrap().push(track);
        self.feedback.lock().unwrap().push(tx);
        Ok(Box::new(MockFeedbackReader { rx }))
    }

    async fn write_rtcp(&self, packets: &[RtcpPacket]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.rtcp.lock().unwrap().extend_from_slice(packets);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self
                .events
                .try_send(TransportEvent::StateChanged(ConnectionState::Closed));
        }
        Ok(())
    }
}

pub(crate) struct MockFeedbackReader {
    rx: mpsc::UnboundedReceiver<Vec<RtcpPacket>>,
}

#[async_trait]
impl FeedbackReader for MockFeedbackReader {
    async fn read_batch(&mut self) -> Result<Vec<RtcpPacket>, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}

pub(crate) struct MockRemoteTrack {
    info: TrackInfo,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Bytes, TransportError>>>,
}

impl MockRemoteTrack {
    pub fn new(
        info: TrackInfo,
    ) -> (
        Arc<Self>,
        mpsc::UnboundedSender<Result<Bytes, TransportError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let track = Arc::new(Self {
            info,
            rx: tokio::sync::Mutex::new(rx),
        });
        (track, tx)
    }
}

#[async_trait]
impl RemoteTrack for MockRemoteTrack {
    fn info(&self) -> &TrackInfo {
        &self.info
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.rx.lock().await.recv().await {
            Some(Ok(packet)) => {
                let n = packet.len().min(buf.len());
                buf[..n].copy_from_slice(&packet[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Closed),
        }
    }
}

pub(crate) struct MockLocalTrack {
    pub info: TrackInfo,
    pub written: Mutex<Vec<Bytes>>,
    pub fail_writes: AtomicBool,
}

impl MockLocalTrack {
    pub fn new(info: TrackInfo) -> Self {
        Self {
            info,
            written: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn written(&self) -> Vec<Bytes> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalTrack for MockLocalTrack {
    fn info(&self) -> &TrackInfo {
        &self.info
    }

    async fn write(&self, packet: &[u8]) -> Result<usize, TransportError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.written
            .lock()
            .unwrap()
            .push(Bytes::copy_from_slice(packet));
        Ok(packet.len())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
