//! Proactive cue budget: at most one unprompted cue per `min_interval`.
//!
//! Cues answering a user utterance bypass the interval but still commit
//! `last_cue_at`, so the next proactive cue waits a full interval.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CueBudget {
    min_interval: Duration,
    /// `None` means "infinitely long ago".
    last_cue_at: Option<Instant>,
}

impl CueBudget {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_cue_at: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn last_cue_at(&self) -> Option<Instant> {
        self.last_cue_at
    }

    /// Forget the last cue so the next one is always allowed.
    pub fn reset(&mut self) {
        self.last_cue_at = None;
    }

    /// Time since the last cue, `None` if there was none.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.last_cue_at.map(|t| now.saturating_duration_since(t))
    }

    /// Whether a cue may be spoken at `now`.
    pub fn permits(&self, now: Instant, bypass: bool) -> bool {
        bypass || self.elapsed(now).map_or(true, |e| e >= self.min_interval)
    }

    /// Record a cue spoken at `now`.
    pub fn record(&mut self, now: Instant) {
        self.last_cue_at = Some(now);
    }

    /// Check and record in one step. Returns false, leaving the budget
    /// untouched, when the cue is throttled.
    ///
    /// A committed cue counts against the interval even if the speaker
    /// later refuses it.
    pub fn commit(&mut self, now: Instant, bypass: bool) -> bool {
        if !self.permits(now, bypass) {
            return false;
        }
        self.record(now);
        true
    }
}
