//! Audio subsystem: mode arbitration and speech I/O collaborators.

pub mod arbiter;
pub mod engine;

pub use arbiter::{AudioModeArbiter, AudioModeConflict, ModeLease};
pub use engine::{AudioEngine, ChannelListener, LogSpeaker, SpeechError, SpeechInput, SpeechOutput};
