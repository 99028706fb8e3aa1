//! Session entry and snapshot types
//!
//! This module defines the per-session state stored in the registry and the
//! copies handed out to callers, which never borrow from the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::session::{PublishedTrack, ResourceId, SessionMode, SessionPhase, TrackFanout};
use crate::transport::Transport;

use super::key::StreamKey;

/// Entry for a single session in the registry
pub struct SessionEntry {
    /// Resource id the session is addressed by
    pub resource_id: ResourceId,

    /// Room and stream the session publishes or subscribes to
    pub key: StreamKey,

    /// Publish or subscribe
    pub mode: SessionMode,

    /// Transport owned by this session
    pub transport: Arc<dyn Transport>,

    /// Tracks this session republishes (publish sessions only)
    pub fanout: TrackFanout,

    /// Current lifecycle phase
    pub phase: SessionPhase,

    /// When the session was created
    pub created_at: Instant,
}

impl SessionEntry {
    /// Create a new entry in the `Created` phase
    pub fn new(
        resource_id: ResourceId,
        key: StreamKey,
        mode: SessionMode,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            resource_id,
            key,
            mode,
            transport,
            fanout: TrackFanout::new(),
            phase: SessionPhase::Created,
            created_at: Instant::now(),
        }
    }

    /// Check if this entry is the publisher of `key`
    pub fn publishes(&self, key: &StreamKey) -> bool {
        self.mode.is_publish() && self.key == *key
    }

    /// Cheap handle to this session
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            resource_id: self.resource_id.clone(),
            key: self.key.clone(),
            mode: self.mode,
            phase: self.phase,
            transport: Arc::clone(&self.transport),
        }
    }

    /// Describe the session for listings
    pub fn describe(&self) -> SessionDescriptor {
        SessionDescriptor {
            resource_id: self.resource_id.to_string(),
            path: self.key.to_string(),
            room: self.key.room.clone(),
            stream: self.key.stream.clone(),
            mode: self.mode,
            phase: self.phase,
            tracks: self.fanout.len(),
            age: self.created_at.elapsed(),
        }
    }
}

/// Handle to a registered session
#[derive(Clone)]
pub struct SessionHandle {
    /// Resource id
    pub resource_id: ResourceId,
    /// Stream key
    pub key: StreamKey,
    /// Publish or subscribe
    pub mode: SessionMode,
    /// Phase at the time the handle was taken
    pub phase: SessionPhase,
    /// The session's transport
    pub transport: Arc<dyn Transport>,
}

/// A publisher as seen by a subscriber at negotiation time
#[derive(Clone)]
pub struct PublisherSnapshot {
    /// Publisher's resource id
    pub resource_id: ResourceId,
    /// Publisher's transport, for keyframe requests
    pub transport: Arc<dyn Transport>,
    /// Tracks published at the time of the snapshot
    pub tracks: Vec<PublishedTrack>,
}

impl PublisherSnapshot {
    /// SSRCs of the publisher's inbound video tracks
    pub fn video_ssrcs(&self) -> Vec<u32> {
        self.tracks
            .iter()
            .filter(|t| t.remote.is_video())
            .map(|t| t.remote.ssrc)
            .collect()
    }
}

/// Introspection record for one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionDescriptor {
    /// Resource id
    #[serde(rename = "uniqueID")]
    pub resource_id: String,
    /// `room/stream`
    pub path: String,
    /// Room
    pub room: String,
    /// Stream
    pub stream: String,
    /// Publish or subscribe
    #[serde(rename = "type")]
    pub mode: SessionMode,
    /// Lifecycle phase
    pub phase: SessionPhase,
    /// Number of published tracks
    pub tracks: usize,
    /// Time since creation
    #[serde(skip)]
    pub age: Duration,
}
