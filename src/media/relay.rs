//! Per-track relay loop
//!
//! Every inbound track of a publisher gets its own task that copies RTP
//! packets, unchanged, into the local track subscribers are attached to and
//! into the room's distribution sink when one is configured.
//!
//! There is no queue between the read and the writes. The first read or
//! write error ends the loop, and the loop withdraws its track from the
//! publisher's fan-out table on the way out. Nothing is retried: the peer
//! renegotiates if it wants the track back.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::registry::{SessionRegistry, StreamKey};
use crate::session::{fanout, ResourceId};
use crate::sink::{SinkError, SinkPool, SinkTrack};
use crate::stats::RelayStats;
use crate::transport::{LocalTrack, RemoteTrack, Transport, TransportError, TransportFactory};

use super::keyframe;

/// Why a relay loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayExit {
    /// Reading from the remote track failed (usually: transport closed)
    ReadFailed(TransportError),
    /// Writing to the local track failed
    WriteFailed(TransportError),
    /// The room's sink could not be connected
    SinkConnectFailed(SinkError),
    /// Writing to the sink failed
    SinkWriteFailed(SinkError),
}

impl std::fmt::Display for RelayExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayExit::ReadFailed(e) => write!(f, "read failed: {}", e),
            RelayExit::WriteFailed(e) => write!(f, "write failed: {}", e),
            RelayExit::SinkConnectFailed(e) => write!(f, "sink connect failed: {}", e),
            RelayExit::SinkWriteFailed(e) => write!(f, "sink write failed: {}", e),
        }
    }
}

/// Shared dependencies of every relay loop
#[derive(Clone)]
pub struct RelayContext {
    /// Registry holding the fan-out tables
    pub registry: Arc<SessionRegistry>,
    /// Engine used to create local tracks
    pub factory: Arc<dyn TransportFactory>,
    /// Per-room sink connections
    pub sinks: Arc<SinkPool>,
    /// Keyframe heartbeat period for video tracks
    pub keyframe_interval: Duration,
    /// Size of the packet read buffer
    pub read_buffer_size: usize,
}

/// Relay of one inbound track
pub struct RelayLoop {
    resource_id: ResourceId,
    key: StreamKey,
    remote: Arc<dyn RemoteTrack>,
    local: Arc<dyn LocalTrack>,
    upstream: Arc<dyn Transport>,
    ctx: RelayContext,
    stats: RelayStats,
}

impl RelayLoop {
    /// Publish `remote` on the session's fan-out table and spawn its loop
    ///
    /// Fails if the session is no longer registered.
    pub async fn spawn(
        ctx: RelayContext,
        resource_id: ResourceId,
        key: StreamKey,
        upstream: Arc<dyn Transport>,
        remote: Arc<dyn RemoteTrack>,
    ) -> Result<JoinHandle<RelayExit>> {
        let local = fanout::add_track(
            &ctx.registry,
            ctx.factory.as_ref(),
            &resource_id,
            remote.info(),
        )
        .await?;

        let relay = RelayLoop {
            resource_id,
            key,
            remote,
            local,
            upstream,
            ctx,
            stats: RelayStats::new(),
        };

        Ok(tokio::spawn(relay.run()))
    }

    /// Run until the first failure, then withdraw the track
    pub async fn run(mut self) -> RelayExit {
        let info = self.remote.info().clone();

        tracing::info!(
            resource_id = %self.resource_id,
            stream = %self.key,
            track = %info.id,
            kind = %info.kind,
            codec = %info.codec.mime_type,
            "Relay started"
        );

        let heartbeat = info.is_video().then(|| {
            keyframe::spawn_heartbeat(
                Arc::clone(&self.upstream),
                info.ssrc,
                self.ctx.keyframe_interval,
            )
        });

        let exit = self.forward().await;

        if let Some(heartbeat) = heartbeat {
            heartbeat.abort();
        }
        fanout::remove_track(&self.ctx.registry, &self.resource_id, &self.local).await;

        tracing::info!(
            resource_id = %self.resource_id,
            track = %info.id,
            packets = self.stats.packets,
            bytes = self.stats.bytes,
            sink_packets = self.stats.sink_packets,
            bitrate = ?self.stats.bitrate(),
            reason = %exit,
            "Relay stopped"
        );

        exit
    }

    async fn forward(&mut self) -> RelayExit {
        let sink_track = match self.attach_sink().await {
            Ok(track) => track,
            Err(e) => return RelayExit::SinkConnectFailed(e),
        };

        let mut buf = vec![0u8; self.ctx.read_buffer_size];
        loop {
            let n = match self.remote.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => return RelayExit::ReadFailed(e),
            };
            let packet = &buf[..n];

            if let Err(e) = self.local.write(packet).await {
                return RelayExit::WriteFailed(e);
            }

            if let Some(ref sink) = sink_track {
                if let Err(e) = sink.write(Bytes::copy_from_slice(packet)).await {
                    return RelayExit::SinkWriteFailed(e);
                }
            }

            self.stats.on_packet(n, sink_track.is_some());
        }
    }

    /// Publish the track into the room's sink, if any
    ///
    /// A refused publication only loses the sink copy; a failed connection
    /// ends the relay.
    async fn attach_sink(&self) -> std::result::Result<Option<Box<dyn SinkTrack>>, SinkError> {
        let Some(sink) = self.ctx.sinks.sink_for(&self.key.room).await? else {
            return Ok(None);
        };

        match sink.publish_track(self.remote.info(), &self.key.stream).await {
            Ok(track) => {
                tracing::info!(
                    room = %self.key.room,
                    name = %self.key.stream,
                    track = %self.remote.info().id,
                    "Track published to sink"
                );
                Ok(Some(track))
            }
            Err(e) => {
                tracing::warn!(
                    room = %self.key.room,
                    name = %self.key.stream,
                    error = %e,
                    "Failed to publish track to sink"
                );
                Ok(None)
            }
        }
    }
}
