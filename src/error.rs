//! Error types for the bridge

use crate::registry::{RegistryError, StreamKey};
use crate::session::{ResourceId, UnknownMode};
use crate::sink::SinkError;
use crate::transport::TransportError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A publisher already holds the stream
    #[error("publish conn [{}] already exist", .0.stream)]
    AdmissionConflict(StreamKey),

    /// Subscribe request for a stream nobody publishes
    #[error("no publisher for room: {}, stream: {}", .0.room, .0.stream)]
    PublisherNotFound(StreamKey),

    /// Unknown resource id
    #[error("stream {0} not found")]
    SessionNotFound(ResourceId),

    /// Offer/answer or ICE gathering failed
    #[error("failed to answer whip conn: {0}")]
    Negotiation(#[source] TransportError),

    /// Transport engine failure outside negotiation
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Distribution sink failure
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Request named an unknown session mode
    #[error(transparent)]
    Mode(#[from] UnknownMode),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::StreamAlreadyPublishing(key) => Error::AdmissionConflict(key),
            RegistryError::SessionNotFound(id) | RegistryError::NotPublishing(id) => {
                Error::SessionNotFound(id)
            }
        }
    }
}
