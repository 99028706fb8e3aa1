//! Session state machine
//!
//! Tracks a session from allocation to teardown:
//!
//! ```text
//! Created ──► Negotiating ──► Connected ──► Closed
//!    │             │                          ▲
//!    └─────────────┴──────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Whether a session ingests or receives media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Publisher sending media into the bridge
    Publish,
    /// Subscriber receiving relayed media
    Subscribe,
}

impl SessionMode {
    /// Check if this is a publishing session
    pub fn is_publish(&self) -> bool {
        *self == SessionMode::Publish
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Publish => f.write_str("publish"),
            SessionMode::Subscribe => f.write_str("subscribe"),
        }
    }
}

/// Unknown session mode in a request path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for SessionMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publish" => Ok(SessionMode::Publish),
            "subscribe" => Ok(SessionMode::Subscribe),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Allocated, not registered yet
    Created,
    /// Offer/answer in progress
    Negotiating,
    /// Transport reported connectivity
    Connected,
    /// Torn down
    Closed,
}

impl SessionPhase {
    /// Enter negotiation
    pub fn start_negotiation(&mut self) -> bool {
        if *self == SessionPhase::Created {
            *self = SessionPhase::Negotiating;
            true
        } else {
            false
        }
    }

    /// Transport is connected
    ///
    /// Returns true only on the first transition, so one-shot work tied to
    /// connecting runs once even if the engine repeats the event.
    pub fn on_connected(&mut self) -> bool {
        if *self == SessionPhase::Negotiating {
            *self = SessionPhase::Connected;
            true
        } else {
            false
        }
    }

    /// Close the session; false if it was already closed
    pub fn close(&mut self) -> bool {
        if *self == SessionPhase::Closed {
            false
        } else {
            *self = SessionPhase::Closed;
            true
        }
    }

    /// Check if the session is closed
    pub fn is_closed(&self) -> bool {
        *self == SessionPhase::Closed
    }
}
