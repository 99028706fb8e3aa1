//! Session registry for publish/subscribe admission
//!
//! The registry is the single source of truth for which sessions exist and
//! which stream each publisher holds. Publishers also keep their track
//! fan-out tables here, so subscribers can discover tracks to attach.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SessionRegistry>
//!                  ┌─────────────────────────────┐
//!                  │ Mutex<HashMap<ResourceId,   │
//!                  │   SessionEntry {            │
//!                  │     key, mode, transport,   │
//!                  │     fanout: TrackFanout,    │
//!                  │   }                         │
//!                  │ >>                          │
//!                  └──────────────┬──────────────┘
//!                                 │
//!        ┌────────────────────────┼────────────────────────┐
//!        │                        │                        │
//!        ▼                        ▼                        ▼
//!   [Controller]             [Relay loop]           [Subscriber]
//!   register_publisher()     insert_track()         find_publishers_for()
//!   remove()                 remove_track()         → snapshot of tracks
//! ```
//!
//! No lock is ever held across transport I/O: callers take snapshots
//! (`SessionHandle`, `PublisherSnapshot`) and talk to transports afterwards.

pub mod entry;
pub mod error;
pub mod key;
pub mod store;

pub use entry::{PublisherSnapshot, SessionDescriptor, SessionEntry, SessionHandle};
pub use error::RegistryError;
pub use key::StreamKey;
pub use store::SessionRegistry;
