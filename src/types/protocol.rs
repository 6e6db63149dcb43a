//! Coaching protocol wire types
//!
//! Field names follow the backend's JSON schema exactly, which is why they
//! stay snake_case on the wire and in Rust.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Correlation Id
// ============================================================================

/// Unique id linking a coaching request to its eventual response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id echoed back by the backend. Anything that is not a UUID
    /// cannot match an outstanding request.
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStateWire {
    pub physical_fatigue: f64,
    pub mental_focus: f64,
    pub consecutive_form_errors: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionMetricsWire {
    pub jitter_percent_increase: f64,
    pub velocity_percent_decrease: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionDataWire {
    pub exercise_id: String,
    pub rep_count_total: u32,
    pub current_set_target_reps: u32,
    pub form_error_detected: String,
    pub metrics: MotionMetricsWire,
    pub uncertainty_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUtteranceWire {
    pub transcribed_text: String,
    pub intent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStateWire {
    pub time_since_last_cue_ms: u64,
}

/// One coaching query: user state, motion/perception summary, the last
/// utterance and how long it has been since the user was last coached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingRequest {
    #[serde(rename = "transaction_id")]
    pub correlation_id: CorrelationId,
    pub timestamp_ms: i64,
    pub user_state: UserStateWire,
    pub motion_data: MotionDataWire,
    pub user_utterance: UserUtteranceWire,
    pub session_state: SessionStateWire,
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceLogWire {
    pub log_transaction_id: String,
    #[serde(default)]
    pub reasoning_chain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedResponseWire {
    #[serde(default)]
    pub text_to_speak: String,
}

/// Backend answer to a [`CoachingRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingResponse {
    pub log: InferenceLogWire,
    pub response: GeneratedResponseWire,
}

impl CoachingResponse {
    /// Build a response echoing `id`.
    pub fn reply(id: CorrelationId, text: impl Into<String>, reasoning: Vec<String>) -> Self {
        Self {
            log: InferenceLogWire {
                log_transaction_id: id.to_string(),
                reasoning_chain: reasoning,
            },
            response: GeneratedResponseWire {
                text_to_speak: text.into(),
            },
        }
    }

    /// The echoed correlation id, if it parses.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        CorrelationId::parse(&self.log.log_transaction_id)
    }

    pub fn text(&self) -> &str {
        &self.response.text_to_speak
    }

    pub fn reasoning(&self) -> &[String] {
        &self.log.reasoning_chain
    }
}
