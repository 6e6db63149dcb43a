//! Coaching Pipeline Module
//!
//! ```text
//! MotionSource -> SensorRingBuffer -> (tick) -> PerceptionAdapter -> PerceptionState
//!       -> CoachingClient (async) -> correlation + session check -> CueBudget
//!       -> AudioModeArbiter -> speech
//! ```
//!
//! Utterances go through the intent classifier first: direct commands never
//! touch the network, questions take the same path as proactive queries but
//! bypass the cue interval.

pub mod cue_budget;
mod orchestrator;
mod state;

pub use cue_budget::CueBudget;
pub use orchestrator::CoachingOrchestrator;
pub use state::{CoachSnapshot, CueOutcome, DropReason, LastCue, OrchestratorStats, UtteranceOutcome};
