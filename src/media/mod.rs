//! Media plane
//!
//! This module provides:
//! - The per-track relay loop (remote track -> local track + sink)
//! - Keyframe requests towards publishers
//! - RTCP feedback aggregation from subscribers back to publishers

pub mod feedback;
pub mod keyframe;
pub mod relay;

pub use feedback::{run_feedback_link, FeedbackAggregator, FeedbackState};
pub use relay::{RelayContext, RelayExit, RelayLoop};
