//! Per-publisher track fan-out table
//!
//! Maps the id of each inbound remote track to the local track that
//! republishes it. Subscribers attach the local tracks to their own
//! transports; the relay loop of the remote track writes into them.
//!
//! The table lives inside the publisher's registry entry, so every change
//! goes through the registry lock. Subscribers see a point-in-time copy:
//! tracks that appear after a subscriber negotiated are not delivered to it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::transport::{LocalTrack, TrackInfo, TransportFactory};

use super::id::ResourceId;

/// A remote track and the local track republishing it
#[derive(Clone)]
pub struct PublishedTrack {
    /// The inbound track's identity (its SSRC is the keyframe request target)
    pub remote: TrackInfo,
    /// Republishable local track
    pub local: Arc<dyn LocalTrack>,
}

impl std::fmt::Debug for PublishedTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishedTrack")
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Remote track id -> published track
#[derive(Default)]
pub struct TrackFanout {
    tracks: HashMap<String, PublishedTrack>,
}

impl TrackFanout {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a published track, returning the one it replaced
    pub fn insert(
        &mut self,
        remote: TrackInfo,
        local: Arc<dyn LocalTrack>,
    ) -> Option<PublishedTrack> {
        self.tracks
            .insert(remote.id.clone(), PublishedTrack { remote, local })
    }

    /// Remove a track, but only if it is still backed by `local`
    pub fn remove(&mut self, track_id: &str, local: &Arc<dyn LocalTrack>) -> bool {
        let same = self
            .tracks
            .get(track_id)
            .map(|t| same_track(&t.local, local))
            .unwrap_or(false);

        if same {
            self.tracks.remove(track_id);
        }
        same
    }

    /// Copy of all published tracks
    pub fn snapshot(&self) -> Vec<PublishedTrack> {
        self.tracks.values().cloned().collect()
    }

    /// Number of published tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Check if no track is published
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

fn same_track(a: &Arc<dyn LocalTrack>, b: &Arc<dyn LocalTrack>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Create the local counterpart of a remote track and publish it on a session
pub async fn add_track(
    registry: &SessionRegistry,
    factory: &dyn TransportFactory,
    resource_id: &ResourceId,
    remote: &TrackInfo,
) -> Result<Arc<dyn LocalTrack>> {
    let local = factory.local_track(remote)?;
    registry
        .insert_track(resource_id, remote.clone(), Arc::clone(&local))
        .await?;
    Ok(local)
}

/// Withdraw a published track from a session
///
/// Returns false if the session is gone or the track was already replaced.
pub async fn remove_track(
    registry: &SessionRegistry,
    resource_id: &ResourceId,
    local: &Arc<dyn LocalTrack>,
) -> bool {
    registry.remove_track(resource_id, local).await
}
