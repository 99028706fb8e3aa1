//! Session identity, lifecycle and per-publisher track fan-out

pub mod fanout;
pub mod id;
pub mod state;

pub use fanout::{PublishedTrack, TrackFanout};
pub use id::ResourceId;
pub use state::{SessionMode, SessionPhase, UnknownMode};
