//! Coaching Orchestrator - session lifecycle, periodic tick, cue policy
//!
//! ```text
//! stopped --start--> active --pause--> paused --start--> active
//!    ^                 |                 |
//!    +------end--------+-------end-------+
//! ```
//!
//! Every tick (only while active):
//! 1. Snapshot the ring buffer and run perception inline
//! 2. Spawn a proactive coaching query with an empty utterance
//!
//! A coaching response is spoken only if it echoes an outstanding request id,
//! the session that asked is still the active one, and the cue budget allows
//! it. Utterance-triggered cues bypass the budget interval. The budget is
//! checked when the query is made, when the response is evaluated, and again
//! immediately before speaking.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cue_budget::CueBudget;
use super::state::{
    CoachSnapshot, CueOutcome, DropReason, LastCue, OrchestratorStats, StatsCounters,
    UtteranceOutcome,
};
use crate::acquisition::{MotionSource, SensorRingBuffer};
use crate::audio::{AudioEngine, SpeechError};
use crate::config::defaults::{ANNOUNCE_END, ANNOUNCE_NEXT, ANNOUNCE_PAUSE, ANNOUNCE_START};
use crate::config::{CoachConfig, SessionConfig, UserConfig};
use crate::intent::{classify, DirectCommand, Intent};
use crate::perception::{InferenceBackend, PerceptionAdapter, PerceptionError};
use crate::protocol::{build_request, CoachingClient, OutstandingRequests, RequestContext, RequestOrigin};
use crate::types::{AudioMode, PerceptionState, SessionState};

// ============================================================================
// Shared State
// ============================================================================

struct TickTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Control {
    state: SessionState,
    epoch: u64,
    started_at: Option<Instant>,
    tick: Option<TickTask>,
}

struct Shared {
    session: SessionConfig,
    user: UserConfig,
    buffer: Arc<SensorRingBuffer>,
    source: Arc<dyn MotionSource>,
    perception: PerceptionAdapter,
    client: Arc<dyn CoachingClient>,
    audio: AudioEngine,
    outstanding: OutstandingRequests,
    /// Lock order: `control` before `budget`.
    control: Mutex<Control>,
    budget: Mutex<CueBudget>,
    last_cue: Mutex<Option<LastCue>>,
    stats: StatsCounters,
    snapshot_tx: watch::Sender<CoachSnapshot>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Top-level coaching driver. Cheap to clone; clones share one session.
///
/// Session control methods are synchronous but must be called from within a
/// Tokio runtime, since they spawn the tick task and announcements.
#[derive(Clone)]
pub struct CoachingOrchestrator {
    shared: Arc<Shared>,
}

impl CoachingOrchestrator {
    pub fn new(
        config: &CoachConfig,
        source: Arc<dyn MotionSource>,
        backend: Arc<dyn InferenceBackend>,
        client: Arc<dyn CoachingClient>,
        audio: AudioEngine,
    ) -> Self {
        let window_len = config.sensors.window_len.max(1);
        let perception = PerceptionAdapter::new(backend, window_len, &config.perception);

        let initial = CoachSnapshot {
            session: SessionState::Stopped,
            session_epoch: 0,
            perception: PerceptionState::default(),
            audio_mode: AudioMode::Idle,
            last_cue: None,
            stats: OrchestratorStats::default(),
            motion_source: source.source_name().to_string(),
            perception_backend: perception.backend_name().to_string(),
            coaching_client: client.client_name().to_string(),
        };
        let (snapshot_tx, _rx) = watch::channel(initial);

        info!(
            window_len,
            tick_ms = config.session.tick_interval_ms,
            min_cue_interval_secs = config.session.min_cue_interval_secs,
            source = source.source_name(),
            backend = perception.backend_name(),
            client = client.client_name(),
            "[Orchestrator] Initialized"
        );

        Self {
            shared: Arc::new(Shared {
                session: config.session.clone(),
                user: config.user.clone(),
                buffer: Arc::new(SensorRingBuffer::new(window_len)),
                source,
                perception,
                client,
                audio,
                outstanding: OutstandingRequests::new(),
                control: Mutex::new(Control {
                    state: SessionState::Stopped,
                    epoch: 0,
                    started_at: None,
                    tick: None,
                }),
                budget: Mutex::new(CueBudget::new(config.session.min_cue_interval())),
                last_cue: Mutex::new(None),
                stats: StatsCounters::default(),
                snapshot_tx,
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Session control
    // ------------------------------------------------------------------------

    /// Start (from stopped) or resume (from paused). Returns false if the
    /// session was already active.
    ///
    /// Starting from stopped resets the ring buffer, perception and cue budget
    /// and begins a new session epoch. Resuming keeps all three.
    pub fn start_session(&self) -> bool {
        let s = &self.shared;
        {
            let mut control = lock(&s.control);
            match control.state {
                SessionState::Active => return false,
                SessionState::Stopped => {
                    control.epoch += 1;
                    control.started_at = Some(Instant::now());
                    s.buffer.reset();
                    s.source.rewind();
                    s.perception.reset();
                    s.outstanding.clear();
                    lock(&s.budget).reset();
                    *lock(&s.last_cue) = None;
                    info!(epoch = control.epoch, "[Orchestrator] Session started");
                }
                SessionState::Paused => {
                    info!(epoch = control.epoch, "[Orchestrator] Session resumed");
                }
            }
            control.state = SessionState::Active;

            let cancel = CancellationToken::new();
            let handle = tokio::spawn(Arc::clone(s).run_ticks(control.epoch, cancel.clone()));
            control.tick = Some(TickTask { cancel, handle });
            s.source.start(Arc::clone(&s.buffer));
        }
        s.publish();
        self.announce(ANNOUNCE_START);
        true
    }

    /// Pause an active session. Returns false if it was not active.
    ///
    /// When this returns the tick driver will not begin another tick and the
    /// motion source has stopped writing.
    pub fn pause_session(&self) -> bool {
        let s = &self.shared;
        {
            let mut control = lock(&s.control);
            if control.state != SessionState::Active {
                return false;
            }
            control.state = SessionState::Paused;
            s.halt(&mut control);
            info!(epoch = control.epoch, "[Orchestrator] Session paused");
        }
        s.publish();
        self.announce(ANNOUNCE_PAUSE);
        true
    }

    /// End the session from active or paused. Returns false if already stopped.
    pub fn end_session(&self) -> bool {
        let s = &self.shared;
        {
            let mut control = lock(&s.control);
            if control.state == SessionState::Stopped {
                return false;
            }
            control.state = SessionState::Stopped;
            s.halt(&mut control);
            s.outstanding.clear();
            info!(
                epoch = control.epoch,
                stats = %s.stats.snapshot(),
                "[Orchestrator] Session ended"
            );
        }
        s.publish();
        self.announce(ANNOUNCE_END);
        true
    }

    // ------------------------------------------------------------------------
    // Utterances
    // ------------------------------------------------------------------------

    /// Route an utterance: commands run locally, questions go to the coach
    /// (bypassing the cue interval), everything else is ignored.
    pub async fn submit_utterance(&self, text: &str) -> UtteranceOutcome {
        let intent = classify(text);
        debug!(intent = %intent, "[Orchestrator] Utterance classified");

        match intent {
            Intent::DirectCommand => match DirectCommand::parse(text) {
                Some(command) => {
                    self.execute(command);
                    UtteranceOutcome::Command { command }
                }
                None => UtteranceOutcome::Ignored { intent },
            },
            Intent::QuestionForCoach => {
                let epoch = lock(&self.shared.control).epoch;
                let result = self
                    .shared
                    .query(text.to_string(), intent, RequestOrigin::Utterance, epoch)
                    .await;
                UtteranceOutcome::Cue { intent, result }
            }
            Intent::AmbientChatter | Intent::Silence | Intent::Unknown => {
                UtteranceOutcome::Ignored { intent }
            }
        }
    }

    /// Open one recognition window and route whatever was heard.
    ///
    /// Fails with [`SpeechError::Busy`] when audio is not idle. Hearing
    /// nothing yields `Ignored { intent: Silence }`.
    pub async fn listen_for_command(&self) -> Result<UtteranceOutcome, SpeechError> {
        let heard = self
            .shared
            .audio
            .listen(self.shared.session.listen_timeout())
            .await
            .map_err(|e| {
                debug!(error = %e, "[Orchestrator] Listen refused");
                e
            })?;
        Ok(self.submit_utterance(heard.as_deref().unwrap_or("")).await)
    }

    fn execute(&self, command: DirectCommand) {
        info!(?command, "[Orchestrator] Direct command");
        match command {
            DirectCommand::End => {
                self.end_session();
            }
            DirectCommand::Pause => {
                self.pause_session();
            }
            DirectCommand::NextExercise => {
                if self.session_state() != SessionState::Stopped {
                    self.announce(ANNOUNCE_NEXT);
                }
            }
        }
    }

    /// Speak a transition announcement outside the cue budget. Dropped when
    /// audio is busy.
    fn announce(&self, text: &'static str) {
        if !self.shared.session.announce_transitions {
            return;
        }
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            match shared.audio.speak(text).await {
                Ok(()) => {}
                Err(SpeechError::Busy(conflict)) => {
                    debug!(%conflict, "[Orchestrator] Announcement dropped");
                }
                Err(e) => warn!(error = %e, "[Orchestrator] Announcement failed"),
            }
        });
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    pub fn session_state(&self) -> SessionState {
        lock(&self.shared.control).state
    }

    pub fn perception(&self) -> PerceptionState {
        self.shared.perception.state()
    }

    pub fn audio_mode(&self) -> AudioMode {
        self.shared.audio.mode()
    }

    pub fn last_cue(&self) -> Option<LastCue> {
        lock(&self.shared.last_cue).clone()
    }

    pub fn stats(&self) -> OrchestratorStats {
        self.shared.stats.snapshot()
    }

    /// Fresh snapshot of everything observable.
    pub fn snapshot(&self) -> CoachSnapshot {
        self.shared.build_snapshot()
    }

    /// Receiver updated on session transitions, perception updates and
    /// delivered cues.
    pub fn subscribe(&self) -> watch::Receiver<CoachSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Receiver updated on every audio mode transition.
    pub fn subscribe_audio(&self) -> watch::Receiver<AudioMode> {
        self.shared.audio.arbiter().subscribe()
    }
}

// ============================================================================
// Tick driver and cue policy
// ============================================================================

impl Shared {
    /// Stop the tick driver and motion source. Caller holds the control lock.
    fn halt(&self, control: &mut Control) {
        if let Some(tick) = control.tick.take() {
            tick.cancel.cancel();
            // The task exits on its own at the next await; dropping the
            // handle detaches it.
            drop(tick.handle);
        }
        self.source.stop();
    }

    fn is_current(&self, epoch: u64) -> bool {
        let control = lock(&self.control);
        control.state == SessionState::Active && control.epoch == epoch
    }

    async fn run_ticks(self: Arc<Self>, epoch: u64, cancel: CancellationToken) {
        let period = self.session.tick_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(epoch, period_ms = period.as_millis() as u64, "[Orchestrator] Tick driver running");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            StatsCounters::bump(&self.stats.ticks);

            let snapshot = self.buffer.snapshot();
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                r = self.perception.infer(&snapshot) => r,
            };

            match result {
                Ok(_) => self.publish(),
                Err(PerceptionError::InsufficientData { .. }) => {
                    StatsCounters::bump(&self.stats.skipped_ticks);
                    continue;
                }
                Err(PerceptionError::Superseded) => continue,
                // Already logged by the adapter; coach on the retained state.
                Err(_) => StatsCounters::bump(&self.stats.perception_failures),
            }

            if cancel.is_cancelled() {
                break;
            }
            let shared = Arc::clone(&self);
            tokio::spawn(async move {
                shared
                    .query(String::new(), Intent::Silence, RequestOrigin::Proactive, epoch)
                    .await;
            });
        }
        debug!(epoch, "[Orchestrator] Tick driver stopped");
    }

    /// One coaching round trip, from budget gate to speech.
    async fn query(&self, utterance: String, intent: Intent, origin: RequestOrigin, epoch: u64) -> CueOutcome {
        let bypass = intent != Intent::Silence;

        if !self.is_current(epoch) {
            return CueOutcome::Dropped(DropReason::SessionInactive);
        }

        let now = Instant::now();
        let since_last_cue = {
            let budget = lock(&self.budget);
            if !budget.permits(now, bypass) {
                StatsCounters::bump(&self.stats.gated_queries);
                return CueOutcome::Dropped(DropReason::Throttled);
            }
            budget.elapsed(now)
        };
        let since_last_cue = since_last_cue.unwrap_or_else(|| {
            lock(&self.control)
                .started_at
                .map_or_else(Default::default, |t| now.saturating_duration_since(t))
        });

        let perception = self.perception.state();
        let request = build_request(RequestContext {
            perception: &perception,
            user: &self.user,
            utterance: &utterance,
            intent,
            since_last_cue,
        });
        let sent = request.correlation_id;
        self.outstanding.register(sent, origin);
        StatsCounters::bump(&self.stats.requests_sent);
        debug!(id = %sent, ?origin, intent = %intent, "[Orchestrator] Coaching request sent");

        let response = match self.client.infer(&request).await {
            Ok(r) => r,
            Err(e) => {
                self.outstanding.forget(sent);
                StatsCounters::bump(&self.stats.transport_errors);
                warn!(id = %sent, client = self.client.client_name(), error = %e, "[Orchestrator] Coaching call failed");
                return CueOutcome::Dropped(DropReason::Transport);
            }
        };

        if self.outstanding.resolve(sent, response.correlation_id()).is_none() {
            StatsCounters::bump(&self.stats.stale_responses);
            debug!(
                sent = %sent,
                echoed = %response.log.log_transaction_id,
                "[Orchestrator] Discarding stale response"
            );
            return CueOutcome::Dropped(DropReason::Stale);
        }
        if !self.is_current(epoch) {
            debug!(id = %sent, "[Orchestrator] Response arrived after session change");
            return CueOutcome::Dropped(DropReason::SessionInactive);
        }

        let text = response.text().trim();
        if text.is_empty() {
            return CueOutcome::Dropped(DropReason::EmptyResponse);
        }
        if !lock(&self.budget).permits(Instant::now(), bypass) {
            StatsCounters::bump(&self.stats.cues_throttled);
            debug!(id = %sent, "[Orchestrator] Cue throttled");
            return CueOutcome::Dropped(DropReason::Throttled);
        }

        self.deliver(text, bypass, epoch).await
    }

    /// Re-check session and budget, commit the cue, then claim the speaker.
    /// A committed cue consumes the interval even when audio refuses it.
    async fn deliver(&self, text: &str, bypass: bool, epoch: u64) -> CueOutcome {
        let reserved = {
            let control = lock(&self.control);
            if control.state != SessionState::Active || control.epoch != epoch {
                return CueOutcome::Dropped(DropReason::SessionInactive);
            }
            if !lock(&self.budget).commit(Instant::now(), bypass) {
                StatsCounters::bump(&self.stats.cues_throttled);
                debug!("[Orchestrator] Cue throttled before speaking");
                return CueOutcome::Dropped(DropReason::Throttled);
            }
            *lock(&self.last_cue) = Some(LastCue {
                text: text.to_string(),
                spoken_at: chrono::Utc::now(),
            });
            self.audio.reserve_speech()
        };

        let lease = match reserved {
            Ok(lease) => lease,
            Err(conflict) => {
                StatsCounters::bump(&self.stats.cues_refused);
                debug!(%conflict, "[Orchestrator] Cue dropped, audio busy");
                self.publish();
                return CueOutcome::Dropped(DropReason::AudioBusy);
            }
        };

        StatsCounters::bump(&self.stats.cues_delivered);
        info!(cue = %text, "[Orchestrator] Delivering cue");
        self.publish();

        if let Err(e) = self.audio.speak_reserved(lease, text).await {
            warn!(error = %e, "[Orchestrator] Speech output failed");
        }
        CueOutcome::Delivered(text.to_string())
    }

    fn build_snapshot(&self) -> CoachSnapshot {
        let (session, session_epoch) = {
            let control = lock(&self.control);
            (control.state, control.epoch)
        };
        let current = self.snapshot_tx.borrow();
        CoachSnapshot {
            session,
            session_epoch,
            perception: self.perception.state(),
            audio_mode: self.audio.mode(),
            last_cue: lock(&self.last_cue).clone(),
            stats: self.stats.snapshot(),
            motion_source: current.motion_source.clone(),
            perception_backend: current.perception_backend.clone(),
            coaching_client: current.coaching_client.clone(),
        }
    }

    fn publish(&self) {
        let snapshot = self.build_snapshot();
        self.snapshot_tx.send_replace(snapshot);
    }
}
