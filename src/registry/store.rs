//! Session registry implementation
//!
//! The single table of every active session, publishers and subscribers
//! alike, keyed by resource id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::session::{ResourceId, SessionMode};
use crate::transport::{LocalTrack, TrackInfo};

use super::entry::{PublisherSnapshot, SessionDescriptor, SessionEntry, SessionHandle};
use super::error::RegistryError;
use super::key::StreamKey;

/// Central registry for all active sessions
///
/// One exclusive lock covers the whole map. Publish admission reads the map
/// and then writes to it, so there is no separate read tier: the check and
/// the insert must happen under the same acquisition or two concurrent
/// publishers could both pass the check.
pub struct SessionRegistry {
    /// Map of resource id to session entry
    sessions: Mutex<HashMap<ResourceId, SessionEntry>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a publisher could be admitted for a stream right now
    ///
    /// Advisory only: the answer may be stale by the time the caller acts on
    /// it. Use [`register_publisher`](Self::register_publisher) to admit.
    pub async fn try_admit_publish(&self, key: &StreamKey) -> bool {
        let sessions = self.sessions.lock().await;
        !sessions.values().any(|s| s.publishes(key))
    }

    /// Admit and register a publish session
    ///
    /// Fails if the stream already has a publisher. The check and the insert
    /// happen under one lock acquisition.
    pub async fn register_publisher(&self, mut entry: SessionEntry) -> Result<(), RegistryError> {
        debug_assert_eq!(entry.mode, SessionMode::Publish);

        let mut sessions = self.sessions.lock().await;

        if sessions.values().any(|s| s.publishes(&entry.key)) {
            tracing::warn!(
                stream = %entry.key,
                resource_id = %entry.resource_id,
                "Publish rejected, stream already has a publisher"
            );
            return Err(RegistryError::StreamAlreadyPublishing(entry.key));
        }

        entry.phase.start_negotiation();
        tracing::info!(
            stream = %entry.key,
            resource_id = %entry.resource_id,
            sessions = sessions.len() + 1,
            "Publisher registered"
        );
        Self::put(&mut sessions, entry);

        Ok(())
    }

    /// Register a session without admission checks
    ///
    /// Used for subscribers. A colliding resource id overwrites the previous
    /// entry, which is returned.
    pub async fn insert(&self, mut entry: SessionEntry) -> Option<SessionEntry> {
        entry.phase.start_negotiation();

        let mut sessions = self.sessions.lock().await;
        tracing::info!(
            stream = %entry.key,
            resource_id = %entry.resource_id,
            mode = %entry.mode,
            sessions = sessions.len() + 1,
            "Session registered"
        );
        Self::put(&mut sessions, entry)
    }

    fn put(
        sessions: &mut HashMap<ResourceId, SessionEntry>,
        entry: SessionEntry,
    ) -> Option<SessionEntry> {
        let previous = sessions.insert(entry.resource_id.clone(), entry);
        if let Some(ref prev) = previous {
            tracing::warn!(
                resource_id = %prev.resource_id,
                stream = %prev.key,
                "Resource id collision, previous session overwritten"
            );
        }
        previous
    }

    /// Remove a session, returning it if it was registered
    ///
    /// The returned entry is marked closed; the caller owns closing its
    /// transport.
    pub async fn remove(&self, resource_id: &ResourceId) -> Option<SessionEntry> {
        let mut sessions = self.sessions.lock().await;
        let mut entry = sessions.remove(resource_id)?;
        entry.phase.close();

        tracing::info!(
            stream = %entry.key,
            resource_id = %resource_id,
            mode = %entry.mode,
            sessions = sessions.len(),
            "Session removed"
        );
        Some(entry)
    }

    /// Look up a session
    pub async fn get(&self, resource_id: &ResourceId) -> Option<SessionHandle> {
        let sessions = self.sessions.lock().await;
        sessions.get(resource_id).map(SessionEntry::handle)
    }

    /// Publishers of a stream with their currently published tracks
    pub async fn find_publishers_for(&self, key: &StreamKey) -> Vec<PublisherSnapshot> {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .filter(|s| s.publishes(key))
            .map(|s| PublisherSnapshot {
                resource_id: s.resource_id.clone(),
                transport: Arc::clone(&s.transport),
                tracks: s.fanout.snapshot(),
            })
            .collect()
    }

    /// Check if any stream of `room` still has a publisher
    pub async fn room_has_publisher(&self, room: &str) -> bool {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .any(|s| s.mode.is_publish() && s.key.room == room)
    }

    /// Describe every registered session
    pub async fn list_all(&self) -> Vec<SessionDescriptor> {
        let sessions = self.sessions.lock().await;
        let mut list: Vec<SessionDescriptor> =
            sessions.values().map(SessionEntry::describe).collect();
        list.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        list
    }

    /// Move a session to `Connected`
    ///
    /// Returns true only for the first transition.
    pub async fn mark_connected(&self, resource_id: &ResourceId) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(resource_id) {
            Some(entry) => entry.phase.on_connected(),
            None => false,
        }
    }

    /// Add a published track to a publish session's fan-out table
    pub async fn insert_track(
        &self,
        resource_id: &ResourceId,
        remote: TrackInfo,
        local: Arc<dyn LocalTrack>,
    ) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.lock().await;

        let entry = sessions
            .get_mut(resource_id)
            .ok_or_else(|| RegistryError::SessionNotFound(resource_id.clone()))?;

        if !entry.mode.is_publish() {
            return Err(RegistryError::NotPublishing(resource_id.clone()));
        }

        tracing::debug!(
            resource_id = %resource_id,
            track = %remote.id,
            kind = %remote.kind,
            "Track published"
        );
        entry.fanout.insert(remote, local);
        Ok(())
    }

    /// Remove a published track if it is still backed by `local`
    pub async fn remove_track(
        &self,
        resource_id: &ResourceId,
        local: &Arc<dyn LocalTrack>,
    ) -> bool {
        let mut sessions = self.sessions.lock().await;

        let Some(entry) = sessions.get_mut(resource_id) else {
            return false;
        };

        let track_id = local.info().id.clone();
        let removed = entry.fanout.remove(&track_id, local);
        if removed {
            tracing::debug!(
                resource_id = %resource_id,
                track = %track_id,
                remaining = entry.fanout.len(),
                "Track withdrawn"
            );
        }
        removed
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Check if no session is registered
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPhase;
    use crate::transport::mock::{audio_info, video_info, MockFactory, MockLocalTrack};
    use crate::transport::TransportFactory;

    async fn entry(mode: SessionMode, room: &str, stream: &str) -> SessionEntry {
        let factory = MockFactory::new();
        let (transport, _events) = factory.create().await.unwrap();
        SessionEntry::new(
            ResourceId::allocate(mode, stream),
            StreamKey::new(room, stream),
            mode,
            transport,
        )
    }

    fn local(info: &TrackInfo) -> Arc<dyn LocalTrack> {
        Arc::new(MockLocalTrack::new(info.clone()))
    }

    #[tokio::test]
    async fn test_register_publisher() {
        let registry = SessionRegistry::new();
        let key = StreamKey::new("live", "cam1");

        assert!(registry.try_admit_publish(&key).await);
        registry
            .register_publisher(entry(SessionMode::Publish, "live", "cam1").await)
            .await
            .unwrap();
        assert!(!registry.try_admit_publish(&key).await);

        // Can't register another publisher
        let result = registry
            .register_publisher(entry(SessionMode::Publish, "live", "cam1").await)
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::StreamAlreadyPublishing(_))
        ));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_stream_in_other_room_is_independent() {
        let registry = SessionRegistry::new();

        registry
            .register_publisher(entry(SessionMode::Publish, "live", "cam1").await)
            .await
            .unwrap();
        registry
            .register_publisher(entry(SessionMode::Publish, "studio", "cam1").await)
            .await
            .unwrap();

        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_admits_exactly_one() {
        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();

        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            let e = entry(SessionMode::Publish, "live", "cam1").await;
            handles.push(tokio::spawn(async move { registry.register_publisher(e).await }));
        }

        let mut admitted = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => admitted += 1,
                Err(RegistryError::StreamAlreadyPublishing(_)) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(conflicts, 31);
        assert_eq!(
            registry
                .find_publishers_for(&StreamKey::new("live", "cam1"))
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_subscribers_do_not_block_publishers() {
        let registry = SessionRegistry::new();
        let key = StreamKey::new("live", "cam1");

        registry
            .insert(entry(SessionMode::Subscribe, "live", "cam1").await)
            .await;
        assert!(registry.try_admit_publish(&key).await);
        assert!(registry.find_publishers_for(&key).await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        let e = entry(SessionMode::Publish, "live", "cam1").await;
        let id = e.resource_id.clone();
        registry.register_publisher(e).await.unwrap();

        let removed = registry.remove(&id).await.unwrap();
        assert_eq!(removed.phase, SessionPhase::Closed);
        assert!(registry.remove(&id).await.is_none());
        assert!(registry.get(&id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_overwrites_on_collision() {
        let registry = SessionRegistry::new();
        let first = entry(SessionMode::Subscribe, "live", "cam1").await;
        let mut second = entry(SessionMode::Subscribe, "live", "cam2").await;
        second.resource_id = first.resource_id.clone();

        assert!(registry.insert(first).await.is_none());
        let previous = registry.insert(second).await.unwrap();

        assert_eq!(previous.key.stream, "cam1");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_phase_transitions() {
        let registry = SessionRegistry::new();
        let e = entry(SessionMode::Publish, "live", "cam1").await;
        let id = e.resource_id.clone();
        registry.register_publisher(e).await.unwrap();

        assert_eq!(
            registry.get(&id).await.unwrap().phase,
            SessionPhase::Negotiating
        );
        assert!(registry.mark_connected(&id).await);
        assert!(!registry.mark_connected(&id).await);
        assert_eq!(registry.get(&id).await.unwrap().phase, SessionPhase::Connected);
    }

    #[tokio::test]
    async fn test_tracks_in_snapshot() {
        let registry = SessionRegistry::new();
        let key = StreamKey::new("live", "cam1");
        let e = entry(SessionMode::Publish, "live", "cam1").await;
        let id = e.resource_id.clone();
        registry.register_publisher(e).await.unwrap();

        let video = video_info("v", 1);
        let audio = audio_info("a", 2);
        let video_local = local(&video);
        registry
            .insert_track(&id, video, Arc::clone(&video_local))
            .await
            .unwrap();
        registry.insert_track(&id, audio.clone(), local(&audio)).await.unwrap();

        let snapshot = registry.find_publishers_for(&key).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].tracks.len(), 2);
        assert_eq!(snapshot[0].video_ssrcs(), vec![1]);

        assert!(registry.remove_track(&id, &video_local).await);
        assert!(!registry.remove_track(&id, &video_local).await);

        let snapshot = registry.find_publishers_for(&key).await;
        assert_eq!(snapshot[0].tracks.len(), 1);
        assert_eq!(snapshot[0].tracks[0].remote.id, "a");
    }

    #[tokio::test]
    async fn test_insert_track_requires_publisher() {
        let registry = SessionRegistry::new();
        let e = entry(SessionMode::Subscribe, "live", "cam1").await;
        let id = e.resource_id.clone();
        registry.insert(e).await;

        let video = video_info("v", 1);
        let result = registry.insert_track(&id, video.clone(), local(&video)).await;
        assert_eq!(result, Err(RegistryError::NotPublishing(id)));

        let unknown = ResourceId::from("publish-cam9-000000000000");
        let result = registry.insert_track(&unknown, video.clone(), local(&video)).await;
        assert_eq!(result, Err(RegistryError::SessionNotFound(unknown)));
    }

    #[tokio::test]
    async fn test_list_all() {
        let registry = SessionRegistry::new();
        registry
            .register_publisher(entry(SessionMode::Publish, "live", "cam1").await)
            .await
            .unwrap();
        registry
            .insert(entry(SessionMode::Subscribe, "live", "cam1").await)
            .await;

        let list = registry.list_all().await;
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|d| d.path == "live/cam1"));
        assert_eq!(
            list.iter().filter(|d| d.mode == SessionMode::Publish).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_room_has_publisher() {
        let registry = SessionRegistry::new();
        let publisher = entry(SessionMode::Publish, "live", "cam1").await;
        let id = publisher.resource_id.clone();
        registry.register_publisher(publisher).await.unwrap();
        registry
            .insert(entry(SessionMode::Subscribe, "studio", "cam1").await)
            .await;

        assert!(registry.room_has_publisher("live").await);
        assert!(!registry.room_has_publisher("studio").await);

        registry.remove(&id).await;
        assert!(!registry.room_has_publisher("live").await);
    }
}
