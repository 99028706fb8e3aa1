//! In-memory distribution sink used by unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use super::{DistributionSink, SinkConnector, SinkError, SinkTrack};
use crate::transport::TrackInfo;

#[derive(Default)]
pub(crate) struct MockConnector {
    pub attempts: AtomicUsize,
    pub connects: AtomicUsize,
    pub stalled_rooms: Mutex<Vec<String>>,
    pub fail_connect: AtomicBool,
    pub fail_publish: AtomicBool,
    pub fail_writes: Arc<AtomicBool>,
    pub published: Arc<Mutex<Vec<String>>>,
    pub written: Arc<Mutex<Vec<Bytes>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make connects for `room` hang forever
    pub fn stall_room(&self, room: &str) {
        self.stalled_rooms.lock().unwrap().push(room.to_string());
    }

    pub fn written(&self) -> Vec<Bytes> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl SinkConnector for MockConnector {
    async fn connect(&self, room: &str) -> Result<Arc<dyn DistributionSink>, SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let stalled = self.stalled_rooms.lock().unwrap().iter().any(|r| r == room);
        if stalled {
            std::future::pending::<()>().await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SinkError::Connect {
                room: room.to_string(),
                reason: "unreachable".into(),
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let sink: Arc<dyn DistributionSink> = Arc::new(MockSink {
            fail_publish: self.fail_publish.load(Ordering::SeqCst),
            fail_writes: Arc::clone(&self.fail_writes),
            published: Arc::clone(&self.published),
            written: Arc::clone(&self.written),
        });
        Ok(sink)
    }
}

struct MockSink {
    fail_publish: bool,
    fail_writes: Arc<AtomicBool>,
    published: Arc<Mutex<Vec<String>>>,
    written: Arc<Mutex<Vec<Bytes>>>,
}

#[async_trait]
impl DistributionSink for MockSink {
    async fn publish_track(
        &self,
        _track: &TrackInfo,
        name: &str,
    ) -> Result<Box<dyn SinkTrack>, SinkError> {
        if self.fail_publish {
            return Err(SinkError::Publish {
                name: name.to_string(),
                reason: "refused".into(),
            });
        }
        self.published.lock().unwrap().push(name.to_string());
        Ok(Box::new(MockSinkTrack {
            fail_writes: Arc::clone(&self.fail_writes),
            written: Arc::clone(&self.written),
        }))
    }
}

struct MockSinkTrack {
    fail_writes: Arc<AtomicBool>,
    written: Arc<Mutex<Vec<Bytes>>>,
}

#[async_trait]
impl SinkTrack for MockSinkTrack {
    async fn write(&self, packet: Bytes) -> Result<(), SinkError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SinkError::Write("sink gone".into()));
        }
        self.written.lock().unwrap().push(packet);
        Ok(())
    }
}
