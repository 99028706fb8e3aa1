//! Session lifecycle controller
//!
//! Creates, negotiates and tears down sessions, wiring relay loops and
//! feedback links to the transports the engine hands out. Each session gets
//! one event task consuming its transport's events; terminal connection
//! states tear the session down through the same path as an explicit delete.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::media::{keyframe, run_feedback_link, RelayContext, RelayLoop};
use crate::registry::{
    PublisherSnapshot, SessionDescriptor, SessionEntry, SessionRegistry, StreamKey,
};
use crate::session::{ResourceId, SessionMode};
use crate::sink::SinkPool;
use crate::transport::{
    ConnectionState, Transport, TransportEvent, TransportEvents, TransportFactory,
};

use super::config::BridgeConfig;

/// Result of a successful negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAnswer {
    /// Id addressing the new session
    pub resource_id: ResourceId,
    /// Room and stream of the session
    pub key: StreamKey,
    /// SDP answer
    pub sdp: String,
}

/// Publisher transport and the video SSRCs to ask it keyframes for
type KeyframeTarget = (Arc<dyn Transport>, Vec<u32>);

/// Session lifecycle controller
///
/// Cheap to clone; clones share the registry, engine and sinks.
#[derive(Clone)]
pub struct Controller {
    config: Arc<BridgeConfig>,
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn TransportFactory>,
    sinks: Arc<SinkPool>,
}

impl Controller {
    /// Create a controller with a fresh registry
    pub fn new(
        config: BridgeConfig,
        factory: Arc<dyn TransportFactory>,
        sinks: SinkPool,
    ) -> Self {
        Self::with_registry(config, factory, sinks, Arc::new(SessionRegistry::new()))
    }

    /// Create a controller sharing an existing registry
    pub fn with_registry(
        config: BridgeConfig,
        factory: Arc<dyn TransportFactory>,
        sinks: SinkPool,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            factory,
            sinks: Arc::new(sinks),
        }
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get the configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Negotiate a new publish or subscribe session
    ///
    /// Fails with `AdmissionConflict` if publishing a stream that already
    /// has a publisher, `PublisherNotFound` if subscribing to a stream
    /// nobody publishes, and `Transport`/`Negotiation` if the engine fails.
    /// A failed session leaves nothing behind.
    pub async fn create_session(
        &self,
        mode: SessionMode,
        room: &str,
        stream: &str,
        offer: &str,
    ) -> Result<SessionAnswer> {
        let key = StreamKey::new(room, stream);
        match mode {
            SessionMode::Publish => self.create_publisher(key, offer).await,
            SessionMode::Subscribe => self.create_subscriber(key, offer).await,
        }
    }

    async fn create_publisher(&self, key: StreamKey, offer: &str) -> Result<SessionAnswer> {
        let resource_id = ResourceId::allocate(SessionMode::Publish, &key.stream);
        let (transport, events) = self.factory.create().await?;

        let entry = SessionEntry::new(
            resource_id.clone(),
            key.clone(),
            SessionMode::Publish,
            Arc::clone(&transport),
        );
        if let Err(e) = self.registry.register_publisher(entry).await {
            close_quietly(&resource_id, transport.as_ref()).await;
            return Err(e.into());
        }

        self.spawn_event_task(
            resource_id.clone(),
            key.clone(),
            SessionMode::Publish,
            Arc::clone(&transport),
            events,
            Vec::new(),
        );

        self.negotiate(resource_id, key, transport.as_ref(), offer)
            .await
    }

    async fn create_subscriber(&self, key: StreamKey, offer: &str) -> Result<SessionAnswer> {
        let publishers = self.registry.find_publishers_for(&key).await;
        if publishers.is_empty() {
            return Err(Error::PublisherNotFound(key));
        }

        let resource_id = ResourceId::allocate(SessionMode::Subscribe, &key.stream);
        let (transport, events) = self.factory.create().await?;

        let attached = self
            .attach_publishers(&resource_id, transport.as_ref(), &publishers)
            .await;
        if let Err(e) = attached {
            close_quietly(&resource_id, transport.as_ref()).await;
            return Err(e);
        }

        let keyframe_targets: Vec<KeyframeTarget> = publishers
            .iter()
            .map(|p| (Arc::clone(&p.transport), p.video_ssrcs()))
            .filter(|(_, ssrcs)| !ssrcs.is_empty())
            .collect();

        self.registry
            .insert(SessionEntry::new(
                resource_id.clone(),
                key.clone(),
                SessionMode::Subscribe,
                Arc::clone(&transport),
            ))
            .await;

        self.spawn_event_task(
            resource_id.clone(),
            key.clone(),
            SessionMode::Subscribe,
            Arc::clone(&transport),
            events,
            keyframe_targets,
        );

        self.negotiate(resource_id, key, transport.as_ref(), offer)
            .await
    }

    /// Attach every published track and start its feedback link
    async fn attach_publishers(
        &self,
        resource_id: &ResourceId,
        transport: &dyn Transport,
        publishers: &[PublisherSnapshot],
    ) -> Result<()> {
        for publisher in publishers {
            for track in &publisher.tracks {
                let reader = transport.add_track(Arc::clone(&track.local)).await?;

                tracing::debug!(
                    resource_id = %resource_id,
                    publisher = %publisher.resource_id,
                    track = %track.remote.id,
                    "Track attached"
                );

                // Ends when the subscriber's transport closes
                tokio::spawn(run_feedback_link(
                    reader,
                    Arc::clone(&publisher.transport),
                    track.remote.ssrc,
                    resource_id.clone(),
                ));
            }
        }
        Ok(())
    }

    async fn negotiate(
        &self,
        resource_id: ResourceId,
        key: StreamKey,
        transport: &dyn Transport,
        offer: &str,
    ) -> Result<SessionAnswer> {
        match transport.answer(offer).await {
            Ok(sdp) => {
                tracing::info!(
                    resource_id = %resource_id,
                    stream = %key,
                    "Session negotiated"
                );
                Ok(SessionAnswer {
                    resource_id,
                    key,
                    sdp,
                })
            }
            Err(e) => {
                tracing::warn!(
                    resource_id = %resource_id,
                    stream = %key,
                    error = %e,
                    "Negotiation failed"
                );
                self.teardown(&resource_id).await;
                Err(Error::Negotiation(e))
            }
        }
    }

    /// Apply a trickled ICE candidate; unknown ids are ignored
    pub async fn add_remote_candidate(
        &self,
        resource_id: &ResourceId,
        candidate: &str,
    ) -> Result<()> {
        let Some(session) = self.registry.get(resource_id).await else {
            tracing::debug!(
                resource_id = %resource_id,
                "Candidate for unknown session ignored"
            );
            return Ok(());
        };

        session.transport.add_ice_candidate(candidate).await?;
        Ok(())
    }

    /// Tear a session down on request
    pub async fn delete_session(&self, resource_id: &ResourceId) -> Result<()> {
        if self.teardown(resource_id).await {
            Ok(())
        } else {
            Err(Error::SessionNotFound(resource_id.clone()))
        }
    }

    /// Describe every registered session
    pub async fn list_sessions(&self) -> Vec<SessionDescriptor> {
        let sessions = self.registry.list_all().await;
        for session in &sessions {
            tracing::debug!(
                resource_id = %session.resource_id,
                path = %session.path,
                mode = %session.mode,
                phase = ?session.phase,
                tracks = session.tracks,
                "Session"
            );
        }
        sessions
    }

    /// Remove a session and close its transport
    ///
    /// Returns false if the session was already gone. Relay loops and
    /// feedback links of the session end on their own once the transport
    /// is closed. The room's sink connection is released with its last
    /// publisher.
    pub async fn teardown(&self, resource_id: &ResourceId) -> bool {
        let Some(entry) = self.registry.remove(resource_id).await else {
            return false;
        };

        close_quietly(resource_id, entry.transport.as_ref()).await;

        if entry.mode.is_publish()
            && self.sinks.is_enabled()
            && !self.registry.room_has_publisher(&entry.key.room).await
        {
            self.sinks.release(&entry.key.room).await;
        }
        true
    }

    fn relay_context(&self) -> RelayContext {
        RelayContext {
            registry: Arc::clone(&self.registry),
            factory: Arc::clone(&self.factory),
            sinks: Arc::clone(&self.sinks),
            keyframe_interval: self.config.keyframe_interval,
            read_buffer_size: self.config.read_buffer_size,
        }
    }

    fn spawn_event_task(
        &self,
        resource_id: ResourceId,
        key: StreamKey,
        mode: SessionMode,
        transport: Arc<dyn Transport>,
        events: TransportEvents,
        keyframe_targets: Vec<KeyframeTarget>,
    ) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller
                .pump_events(resource_id, key, mode, transport, events, keyframe_targets)
                .await;
        });
    }

    async fn pump_events(
        &self,
        resource_id: ResourceId,
        key: StreamKey,
        mode: SessionMode,
        transport: Arc<dyn Transport>,
        mut events: TransportEvents,
        mut keyframe_targets: Vec<KeyframeTarget>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Track(remote) => {
                    if !mode.is_publish() {
                        tracing::debug!(
                            resource_id = %resource_id,
                            "Ignoring track on subscribe session"
                        );
                        continue;
                    }

                    let spawned = RelayLoop::spawn(
                        self.relay_context(),
                        resource_id.clone(),
                        key.clone(),
                        Arc::clone(&transport),
                        remote,
                    )
                    .await;
                    if let Err(e) = spawned {
                        tracing::warn!(
                            resource_id = %resource_id,
                            error = %e,
                            "Failed to relay track"
                        );
                    }
                }
                TransportEvent::StateChanged(state) => {
                    tracing::info!(
                        resource_id = %resource_id,
                        stream = %key,
                        state = %state,
                        "Connection state changed"
                    );

                    if state == ConnectionState::Connected {
                        if self.registry.mark_connected(&resource_id).await {
                            for (publisher, ssrcs) in keyframe_targets.drain(..) {
                                keyframe::spawn_delayed_request(
                                    publisher,
                                    ssrcs,
                                    self.config.subscriber_keyframe_delay,
                                );
                            }
                        }
                    } else if state.is_terminal() {
                        self.teardown(&resource_id).await;
                        break;
                    }
                }
            }
        }

        tracing::debug!(resource_id = %resource_id, "Event task finished");
    }
}

async fn close_quietly(resource_id: &ResourceId, transport: &dyn Transport) {
    if let Err(e) = transport.close().await {
        tracing::warn!(resource_id = %resource_id, error = %e, "Failed to close transport");
    }
}
