//! Chimera Coach: Real-Time Multimodal Coaching Orchestrator
//!
//! Continuously ingests motion sensor streams, classifies exercise state with
//! a perception model, and decides when a short coaching cue may be spoken.
//!
//! ## Architecture
//!
//! - **Acquisition**: motion sources writing into a fixed-length ring buffer
//! - **Perception**: windowed inference and tensor decoding
//! - **Intent**: rule-based routing of user utterances
//! - **Audio**: listen/speak mutual exclusion
//! - **Pipeline**: session lifecycle, tick driver and cue budget
//! - **Protocol**: coaching request/response wire schema and correlation

pub mod acquisition;
pub mod api;
pub mod audio;
pub mod config;
pub mod intent;
pub mod perception;
pub mod pipeline;
pub mod protocol;
pub mod types;

pub use config::CoachConfig;

pub use types::{
    AudioMode, Channel, ChannelMask, CoachingRequest, CoachingResponse, CorrelationId,
    Exercise, FormQuality, PerceptionState, Sample, SessionState,
};

pub use acquisition::{MotionSource, SensorRingBuffer};
pub use audio::{AudioEngine, AudioModeArbiter};
pub use intent::{classify, DirectCommand, Intent};
pub use perception::{InferenceBackend, PerceptionAdapter, PerceptionError};
pub use pipeline::{CoachingOrchestrator, CueBudget, CueOutcome, DropReason, UtteranceOutcome};
pub use protocol::{CoachingClient, TransportError};
