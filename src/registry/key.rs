//! Stream identity

use serde::Serialize;

/// Logical stream address (room + stream name)
///
/// At most one publisher may hold a given key at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StreamKey {
    /// Room the stream belongs to (e.g., "live")
    pub room: String,
    /// Stream name within the room (e.g., "cam1")
    pub stream: String,
}

impl StreamKey {
    /// Create a new stream key
    pub fn new(room: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            stream: stream.into(),
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.room, self.stream)
    }
}
