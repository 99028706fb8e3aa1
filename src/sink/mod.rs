//! External distribution sink
//!
//! A sink republishes relayed tracks into a wider system (a room of an SFU
//! cluster, for example). The bridge connects one sink per room, lazily on
//! the first relayed track, and reuses that connection for every track and
//! stream of the room until the room's last publisher leaves.

#[cfg(test)]
pub(crate) mod mock;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, OnceCell};

use crate::transport::TrackInfo;

/// Error reported by a distribution sink
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Connecting to the sink for a room failed
    #[error("failed to connect sink for room {room}: {reason}")]
    Connect {
        /// Room the connection was for
        room: String,
        /// Reason given by the sink
        reason: String,
    },
    /// The sink refused the track
    #[error("failed to publish track {name}: {reason}")]
    Publish {
        /// Publication name
        name: String,
        /// Reason given by the sink
        reason: String,
    },
    /// Writing media to the sink failed
    #[error("sink write failed: {0}")]
    Write(String),
}

/// Writer for one track published into a sink
///
/// Packets are handed over owned; sinks usually queue them for a
/// connection task of their own.
#[async_trait]
pub trait SinkTrack: Send + Sync {
    /// Write one RTP packet
    async fn write(&self, packet: Bytes) -> Result<(), SinkError>;
}

/// Connection to the distribution system for one room
#[async_trait]
pub trait DistributionSink: Send + Sync {
    /// Publish a track under `name`
    async fn publish_track(
        &self,
        track: &TrackInfo,
        name: &str,
    ) -> Result<Box<dyn SinkTrack>, SinkError>;
}

/// Opens sink connections
#[async_trait]
pub trait SinkConnector: Send + Sync {
    /// Connect to the distribution system for `room`
    async fn connect(&self, room: &str) -> Result<Arc<dyn DistributionSink>, SinkError>;
}

/// Per-room cache of sink connections
///
/// Each room has its own cell, so a slow connect only holds up callers for
/// that room.
pub struct SinkPool {
    connector: Option<Arc<dyn SinkConnector>>,
    rooms: Mutex<HashMap<String, Arc<RoomSink>>>,
}

type RoomSink = OnceCell<Arc<dyn DistributionSink>>;

impl SinkPool {
    /// Create a pool connecting through `connector`
    pub fn new(connector: Arc<dyn SinkConnector>) -> Self {
        Self {
            connector: Some(connector),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// A pool without sink; relays only fan out locally
    pub fn disabled() -> Self {
        Self {
            connector: None,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Check if a connector is configured
    pub fn is_enabled(&self) -> bool {
        self.connector.is_some()
    }

    /// Get the sink for a room, connecting on first use
    ///
    /// Returns `Ok(None)` when the pool is disabled. Concurrent callers for
    /// the same room share one connect; a failed connect leaves the room
    /// unconnected for the next caller to retry.
    pub async fn sink_for(
        &self,
        room: &str,
    ) -> Result<Option<Arc<dyn DistributionSink>>, SinkError> {
        let Some(connector) = &self.connector else {
            return Ok(None);
        };

        let cell = {
            let mut rooms = self.rooms.lock().await;
            Arc::clone(rooms.entry(room.to_string()).or_default())
        };

        let sink = cell
            .get_or_try_init(|| async {
                let sink = connector.connect(room).await?;
                tracing::info!(room = %room, "Distribution sink connected");
                Ok::<_, SinkError>(sink)
            })
            .await?;
        Ok(Some(Arc::clone(sink)))
    }

    /// Drop the room's connection from the pool
    ///
    /// Relay loops still holding the sink keep it alive until they end; the
    /// next relayed track in the room connects again. Returns false if the
    /// room had no entry.
    pub async fn release(&self, room: &str) -> bool {
        let released = self.rooms.lock().await.remove(room).is_some();
        if released {
            tracing::info!(room = %room, "Distribution sink released");
        }
        released
    }

    /// Number of rooms with a live sink connection
    pub async fn room_count(&self) -> usize {
        self.rooms
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}

impl Default for SinkPool {
    fn default() -> Self {
        Self::disabled()
    }
}
