//! Shared data structures for the coaching loop
//!
//! - Sensor samples and channel masks (ring buffer contents)
//! - Perception output (exercise, form, reps, fatigue)
//! - Session lifecycle and audio mode
//! - Coaching protocol wire types

mod sample;
mod perception;
mod session;
mod protocol;

pub use sample::*;
pub use perception::*;
pub use session::*;
pub use protocol::*;
