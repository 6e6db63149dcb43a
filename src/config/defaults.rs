//! System-wide default constants.
//!
//! Grouped by subsystem. Config structs use these for their `Default` impls.

// ============================================================================
// Session
// ============================================================================

/// Period of the orchestrator tick (ms).
pub const TICK_INTERVAL_MS: u64 = 1_000;

/// Minimum spacing between proactive coaching cues (seconds).
pub const MIN_CUE_INTERVAL_SECS: f64 = 8.0;

/// Voice-command recognition window handed to the speech-input collaborator (ms).
pub const LISTEN_TIMEOUT_MS: u64 = 1_500;

// ============================================================================
// Sensors
// ============================================================================

/// Ring buffer length (samples). 300 samples = 6 s at 50 Hz.
pub const WINDOW_LEN: usize = 300;

/// Accelerometer / gyroscope update rate (Hz).
pub const INERTIAL_RATE_HZ: u32 = 50;

/// Nominal interval between barometer updates (ms). Actual spacing is jittered.
pub const PRESSURE_INTERVAL_MS: u64 = 1_000;

/// Standard sea-level pressure used to seed the barometer latch (kPa).
pub const SEA_LEVEL_PRESSURE_KPA: f32 = 101.325;

// ============================================================================
// Perception
// ============================================================================

/// Mean rep probability above which one repetition is counted per inference.
pub const REP_THRESHOLD: f32 = 0.5;

// ============================================================================
// Coaching Backend
// ============================================================================

pub const BACKEND_BASE_URL: &str = "http://localhost:8080";

/// Path of the inference endpoint, relative to the base URL.
pub const BACKEND_INFER_PATH: &str = "/cognitive-core/infer";

/// HTTP request timeout for coaching queries (seconds).
pub const BACKEND_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Speech
// ============================================================================

pub const SPEECH_VOICE: &str = "en-US";

/// Synthesis rate, slightly slower than the platform default.
pub const SPEECH_RATE: f32 = 0.48;

pub const SPEECH_VOLUME: f32 = 0.9;

/// Used to estimate utterance duration for the logging speaker.
pub const SPEECH_WORDS_PER_MINUTE: u32 = 160;

// ============================================================================
// User Profile
// ============================================================================

pub const CURRENT_SET_TARGET_REPS: u32 = 20;
pub const MENTAL_FOCUS: f64 = 0.7;
pub const UNCERTAINTY_SCORE: f64 = 0.9;

// ============================================================================
// Control API
// ============================================================================

pub const SERVER_ADDR: &str = "127.0.0.1:8090";

// ============================================================================
// Announcements
// ============================================================================

pub const ANNOUNCE_START: &str = "Starting workout. I'll keep it concise.";
pub const ANNOUNCE_PAUSE: &str = "Workout paused.";
pub const ANNOUNCE_END: &str = "Workout complete. Great work today.";
pub const ANNOUNCE_NEXT: &str = "Okay, moving to the next exercise.";
