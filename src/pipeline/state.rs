//! Orchestrator observation types: outcomes, statistics, snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::intent::{DirectCommand, Intent};
use crate::types::{AudioMode, PerceptionState, SessionState};

// ============================================================================
// Outcomes
// ============================================================================

/// Why a coaching cue was not spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Session not active, or a different session than the one that asked.
    SessionInactive,
    /// Within the minimum cue interval.
    Throttled,
    /// Response id did not match an outstanding request.
    Stale,
    /// The coaching call failed.
    Transport,
    /// The coach had nothing to say.
    EmptyResponse,
    /// Audio was listening or speaking.
    AudioBusy,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DropReason::SessionInactive => "session inactive",
            DropReason::Throttled => "throttled",
            DropReason::Stale => "stale response",
            DropReason::Transport => "transport error",
            DropReason::EmptyResponse => "empty response",
            DropReason::AudioBusy => "audio busy",
        };
        f.write_str(s)
    }
}

/// Result of one coaching attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum CueOutcome {
    Delivered(String),
    Dropped(DropReason),
}

/// What happened to a user utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum UtteranceOutcome {
    /// A session command, executed locally.
    Command { command: DirectCommand },
    /// A question routed to the coach.
    Cue { intent: Intent, result: CueOutcome },
    /// Nothing actionable (silence, chatter, unknown).
    Ignored { intent: Intent },
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    pub ticks: u64,
    /// Ticks skipped because the snapshot was unusable
    pub skipped_ticks: u64,
    pub perception_failures: u64,
    pub requests_sent: u64,
    /// Proactive queries not sent because the budget would reject the cue
    pub gated_queries: u64,
    pub transport_errors: u64,
    pub stale_responses: u64,
    pub cues_delivered: u64,
    pub cues_throttled: u64,
    /// Cues lost because audio was busy
    pub cues_refused: u64,
}

impl std::fmt::Display for OrchestratorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Orchestrator: {} ticks ({} skipped), {} requests, {} cues delivered ({} throttled, {} refused, {} stale)",
            self.ticks,
            self.skipped_ticks,
            self.requests_sent,
            self.cues_delivered,
            self.cues_throttled,
            self.cues_refused,
            self.stale_responses,
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub ticks: AtomicU64,
    pub skipped_ticks: AtomicU64,
    pub perception_failures: AtomicU64,
    pub requests_sent: AtomicU64,
    pub gated_queries: AtomicU64,
    pub transport_errors: AtomicU64,
    pub stale_responses: AtomicU64,
    pub cues_delivered: AtomicU64,
    pub cues_throttled: AtomicU64,
    pub cues_refused: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OrchestratorStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        OrchestratorStats {
            ticks: get(&self.ticks),
            skipped_ticks: get(&self.skipped_ticks),
            perception_failures: get(&self.perception_failures),
            requests_sent: get(&self.requests_sent),
            gated_queries: get(&self.gated_queries),
            transport_errors: get(&self.transport_errors),
            stale_responses: get(&self.stale_responses),
            cues_delivered: get(&self.cues_delivered),
            cues_throttled: get(&self.cues_throttled),
            cues_refused: get(&self.cues_refused),
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Most recently delivered cue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastCue {
    pub text: String,
    pub spoken_at: DateTime<Utc>,
}

/// Everything an observer (UI, control API) needs in one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoachSnapshot {
    pub session: SessionState,
    /// Increments every time a session starts from stopped
    pub session_epoch: u64,
    pub perception: PerceptionState,
    pub audio_mode: AudioMode,
    pub last_cue: Option<LastCue>,
    pub stats: OrchestratorStats,
    pub motion_source: String,
    pub perception_backend: String,
    pub coaching_client: String,
}
