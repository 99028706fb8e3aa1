//! Registry error types
//!
//! Error types for session registry operations.

use super::key::StreamKey;
use crate::session::ResourceId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Stream already has a publisher
    StreamAlreadyPublishing(StreamKey),
    /// No session with this resource id
    SessionNotFound(ResourceId),
    /// Operation only valid on a publish session
    NotPublishing(ResourceId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamAlreadyPublishing(key) => {
                write!(f, "Stream already has a publisher: {}", key)
            }
            RegistryError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            RegistryError::NotPublishing(id) => write!(f, "Session is not publishing: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
