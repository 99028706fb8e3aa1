//! Resource identifiers
//!
//! Every session is addressed by an opaque id of the form
//! `{mode}-{stream}-{random12}`. The prefix keeps logs readable; the random
//! suffix makes collisions unlikely but not impossible. Uniqueness is only
//! as strong as the suffix: the registry overwrites on a collision.

use std::borrow::Borrow;
use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::state::SessionMode;

/// Length of the random suffix
pub const SUFFIX_LEN: usize = 12;

/// Identifier of a session resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    /// Allocate a fresh identifier for a session
    pub fn allocate(mode: SessionMode, stream: &str) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();

        Self(format!("{}-{}-{}", mode, stream, suffix))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
