//! Session Integration Tests
//!
//! Drives a full `CoachingOrchestrator` with scripted collaborators:
//! a motion source that never writes, an inference backend with fixed
//! outputs, a coaching client that echoes (or mangles) request ids, and a
//! speaker that records what it was asked to say. Every test runs on paused
//! Tokio time, so ticks fire exactly on the configured interval.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use chimera_coach::acquisition::{MotionSource, SensorRingBuffer};
use chimera_coach::audio::{AudioEngine, AudioModeArbiter, ChannelListener, SpeechError, SpeechOutput};
use chimera_coach::config::defaults::ANNOUNCE_START;
use chimera_coach::config::CoachConfig;
use chimera_coach::intent::{DirectCommand, Intent};
use chimera_coach::perception::{
    InferenceBackend, InputTensor, TensorOutputs, EXERCISE_LOGITS, FATIGUE, FORM_LOGITS,
    REP_PROBABILITY,
};
use chimera_coach::pipeline::{CoachingOrchestrator, CueOutcome, DropReason, UtteranceOutcome};
use chimera_coach::protocol::{CoachingClient, TransportError};
use chimera_coach::types::{
    AudioMode, CoachingRequest, CoachingResponse, CorrelationId, Exercise, FormQuality,
    SessionState,
};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct ManualSource {
    running: AtomicBool,
    starts: AtomicUsize,
    rewinds: AtomicUsize,
}

impl MotionSource for ManualSource {
    fn start(&self, _sink: Arc<SensorRingBuffer>) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn source_name(&self) -> &str {
        "manual"
    }

    fn rewind(&self) {
        self.rewinds.fetch_add(1, Ordering::SeqCst);
    }
}

/// Always reports arm circles with good form and a rep probability mean of 0.6.
struct ScriptedBackend;

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn run(&self, _input: &InputTensor) -> anyhow::Result<TensorOutputs> {
        Ok(TensorOutputs::new()
            .with(EXERCISE_LOGITS, vec![0.1, 2.0, 0.3, 0.0, 0.0])
            .with(FATIGUE, vec![0.3])
            .with(REP_PROBABILITY, vec![0.5, 0.7])
            .with(FORM_LOGITS, vec![0.1, 0.2, 0.9]))
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Clone, Copy)]
enum Reply {
    /// Echo the request id.
    Echo,
    /// Reply with an id nobody asked for.
    WrongId,
    /// Fail the call.
    Fail,
}

struct ScriptedClient {
    reply: Reply,
    text: &'static str,
    latency: Duration,
    requests: Mutex<Vec<CoachingRequest>>,
}

impl ScriptedClient {
    fn new(reply: Reply, text: &'static str) -> Self {
        Self {
            reply,
            text,
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn requests(&self) -> Vec<CoachingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CoachingClient for ScriptedClient {
    async fn infer(&self, request: &CoachingRequest) -> Result<CoachingResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.reply {
            Reply::Echo => Ok(CoachingResponse::reply(request.correlation_id, self.text, vec![])),
            Reply::WrongId => Ok(CoachingResponse::reply(CorrelationId::new(), self.text, vec![])),
            Reply::Fail => Err(TransportError::Client("connection refused".into())),
        }
    }

    fn client_name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingSpeaker {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSpeaker {
    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechOutput for RecordingSpeaker {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    coach: CoachingOrchestrator,
    source: Arc<ManualSource>,
    client: Arc<ScriptedClient>,
    speaker: Arc<RecordingSpeaker>,
    arbiter: AudioModeArbiter,
    transcripts: mpsc::Sender<String>,
}

fn test_config() -> CoachConfig {
    let mut config = CoachConfig::default();
    config.session.tick_interval_ms = 1_000;
    config.session.min_cue_interval_secs = 8.0;
    config.session.announce_transitions = false;
    config.session.listen_timeout_ms = 200;
    config.sensors.window_len = 4;
    config
}

fn harness_with(config: CoachConfig, client: ScriptedClient) -> Harness {
    let source = Arc::new(ManualSource::default());
    let client = Arc::new(client);
    let speaker = Arc::new(RecordingSpeaker::default());
    let (listener, transcripts) = ChannelListener::new(4);
    let audio = AudioEngine::new(speaker.clone(), Arc::new(listener));
    let arbiter = audio.arbiter().clone();

    let coach = CoachingOrchestrator::new(
        &config,
        source.clone(),
        Arc::new(ScriptedBackend),
        client.clone(),
        audio,
    );
    Harness {
        coach,
        source,
        client,
        speaker,
        arbiter,
        transcripts,
    }
}

fn harness(reply: Reply) -> Harness {
    harness_with(test_config(), ScriptedClient::new(reply, "Nice pace, keep it up."))
}

async fn run_for(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// ============================================================================
// Cue policy
// ============================================================================

#[tokio::test(start_paused = true)]
async fn first_tick_after_start_delivers_a_cue() {
    let h = harness(Reply::Echo);
    assert!(h.coach.start_session());
    assert!(h.source.is_running());

    run_for(1_050).await;

    assert_eq!(h.speaker.spoken(), vec!["Nice pace, keep it up."]);
    let last = h.coach.last_cue().expect("cue recorded");
    assert_eq!(last.text, "Nice pace, keep it up.");

    let stats = h.coach.stats();
    assert_eq!(stats.ticks, 1);
    assert_eq!(stats.requests_sent, 1);
    assert_eq!(stats.cues_delivered, 1);
    assert_eq!(h.coach.audio_mode(), AudioMode::Idle);
}

#[tokio::test(start_paused = true)]
async fn ticks_inside_min_interval_yield_one_cue() {
    let h = harness(Reply::Echo);
    h.coach.start_session();

    // Ticks at 1s..7s; only the first may speak.
    run_for(7_050).await;
    assert_eq!(h.speaker.spoken().len(), 1);

    let stats = h.coach.stats();
    assert_eq!(stats.ticks, 7);
    assert_eq!(stats.cues_delivered, 1);
    assert_eq!(stats.gated_queries, 6, "gated ticks never reach the backend");
    assert_eq!(stats.requests_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn next_proactive_cue_waits_a_full_interval() {
    let h = harness(Reply::Echo);
    h.coach.start_session();

    // First cue at 1s, next allowed at 9s.
    run_for(8_900).await;
    assert_eq!(h.speaker.spoken().len(), 1);
    run_for(200).await;
    assert_eq!(h.speaker.spoken().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn question_bypasses_min_interval() {
    let h = harness(Reply::Echo);
    h.coach.start_session();
    run_for(1_050).await;
    assert_eq!(h.speaker.spoken().len(), 1);

    let outcome = h.coach.submit_utterance("how many reps left").await;
    assert_eq!(
        outcome,
        UtteranceOutcome::Cue {
            intent: Intent::QuestionForCoach,
            result: CueOutcome::Delivered("Nice pace, keep it up.".into()),
        }
    );
    assert_eq!(h.speaker.spoken().len(), 2);

    let requests = h.client.requests();
    let question = requests.last().unwrap();
    assert_eq!(question.user_utterance.transcribed_text, "how many reps left");
    assert_eq!(question.user_utterance.intent, "question_for_coach");

    // The answered question still counts as the last cue.
    run_for(7_000).await;
    assert_eq!(h.speaker.spoken().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn mismatched_correlation_id_is_discarded() {
    let h = harness(Reply::WrongId);
    h.coach.start_session();
    run_for(1_050).await;

    assert!(h.speaker.spoken().is_empty());
    assert!(h.coach.last_cue().is_none());
    assert_eq!(h.coach.stats().stale_responses, 1);
    assert_eq!(h.coach.stats().cues_delivered, 0);

    let outcome = h.coach.submit_utterance("how many more").await;
    assert_eq!(
        outcome,
        UtteranceOutcome::Cue {
            intent: Intent::QuestionForCoach,
            result: CueOutcome::Dropped(DropReason::Stale),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn transport_failure_drops_the_cycle_silently() {
    let h = harness(Reply::Fail);
    h.coach.start_session();
    run_for(2_050).await;

    assert!(h.speaker.spoken().is_empty());
    let stats = h.coach.stats();
    assert_eq!(stats.transport_errors, 2, "no retry, one failure per tick");
    assert_eq!(stats.requests_sent, 2);
}

#[tokio::test(start_paused = true)]
async fn empty_coach_text_is_not_spoken() {
    let h = harness_with(test_config(), ScriptedClient::new(Reply::Echo, "   "));
    h.coach.start_session();
    run_for(1_050).await;
    assert!(h.speaker.spoken().is_empty());

    // Nothing was spoken, so the next tick may still speak.
    run_for(1_000).await;
    assert_eq!(h.coach.stats().requests_sent, 2);
}

#[tokio::test(start_paused = true)]
async fn busy_audio_drops_cue_but_consumes_budget() {
    let h = harness(Reply::Echo);
    h.coach.start_session();

    let lease = h.arbiter.request_listen().unwrap();
    run_for(1_050).await;
    assert!(h.speaker.spoken().is_empty());
    assert_eq!(h.coach.stats().cues_refused, 1);
    assert_eq!(
        h.coach.last_cue().map(|c| c.text).as_deref(),
        Some("Nice pace, keep it up."),
        "refused cue is still recorded"
    );

    // Tick 2 at t=2s falls inside the interval started by the refused cue.
    drop(lease);
    run_for(1_000).await;
    assert!(h.speaker.spoken().is_empty());
    let stats = h.coach.stats();
    assert_eq!(stats.cues_delivered, 0);
    assert_eq!(stats.gated_queries, 1);

    // The interval ends at t=9s.
    run_for(7_000).await;
    assert_eq!(h.speaker.spoken(), vec!["Nice pace, keep it up."]);
}

#[tokio::test(start_paused = true)]
async fn overlapping_proactive_responses_speak_once() {
    let client = ScriptedClient::new(Reply::Echo, "cue").with_latency(Duration::from_millis(1_500));
    let h = harness_with(test_config(), client);
    h.coach.start_session();

    // Ticks at 1s and 2s both pass the query gate before either response
    // lands (2.5s and 3.5s). Only the first may speak.
    run_for(4_050).await;

    assert_eq!(h.speaker.spoken(), vec!["cue"]);
    let stats = h.coach.stats();
    assert_eq!(stats.requests_sent, 2);
    assert_eq!(stats.cues_delivered, 1);
    assert_eq!(stats.cues_throttled, 1);
    assert_eq!(stats.gated_queries, 2, "ticks at 3s and 4s are gated");
}

// ============================================================================
// Perception
// ============================================================================

#[tokio::test(start_paused = true)]
async fn rep_count_grows_by_one_per_tick() {
    let h = harness(Reply::Echo);
    h.coach.start_session();
    run_for(3_050).await;

    let perception = h.coach.perception();
    assert_eq!(perception.rep_count, 3);
    assert_eq!(perception.inferences, 3);
    assert_eq!(perception.exercise, Exercise::ArmCircles);
    assert_eq!(perception.form_quality, FormQuality::Good);
    assert!((perception.fatigue_level - 0.3).abs() < 1e-6);

    let first = &h.client.requests()[0];
    assert_eq!(first.motion_data.exercise_id, "arm_circles");
    assert_eq!(first.motion_data.rep_count_total, 1);
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn pause_stops_ticks_and_resume_keeps_state() {
    let h = harness(Reply::Echo);
    h.coach.start_session();
    run_for(2_050).await;
    assert_eq!(h.coach.stats().ticks, 2);

    assert!(h.coach.pause_session());
    assert!(!h.coach.pause_session());
    assert_eq!(h.coach.session_state(), SessionState::Paused);
    assert!(!h.source.is_running());

    run_for(5_000).await;
    assert_eq!(h.coach.stats().ticks, 2, "no ticks while paused");

    assert!(h.coach.start_session());
    assert_eq!(h.coach.session_state(), SessionState::Active);
    assert_eq!(h.source.starts.load(Ordering::SeqCst), 2);
    assert_eq!(h.source.rewinds.load(Ordering::SeqCst), 1, "resume keeps the replay position");
    run_for(1_050).await;

    assert_eq!(h.coach.perception().rep_count, 3, "resume keeps perception");
    assert_eq!(h.coach.snapshot().session_epoch, 1);
}

#[tokio::test(start_paused = true)]
async fn new_session_resets_perception_and_budget() {
    let h = harness(Reply::Echo);
    h.coach.start_session();
    run_for(1_050).await;
    assert_eq!(h.speaker.spoken().len(), 1);

    assert!(h.coach.end_session());
    assert!(!h.coach.end_session());
    assert_eq!(h.coach.session_state(), SessionState::Stopped);
    assert!(h.coach.last_cue().is_some(), "last cue survives until the next start");

    assert!(h.coach.start_session());
    assert_eq!(h.source.rewinds.load(Ordering::SeqCst), 2);
    assert_eq!(h.coach.perception().rep_count, 0);
    assert!(h.coach.last_cue().is_none());
    assert_eq!(h.coach.snapshot().session_epoch, 2);

    // Less than min_interval since the previous cue, but a fresh session.
    run_for(1_050).await;
    assert_eq!(h.speaker.spoken().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn response_after_session_end_is_dropped() {
    let client = ScriptedClient::new(Reply::Echo, "Late advice").with_latency(Duration::from_millis(500));
    let h = harness_with(test_config(), client);
    h.coach.start_session();

    run_for(1_200).await;
    assert_eq!(h.coach.stats().requests_sent, 1);
    h.coach.end_session();

    run_for(1_000).await;
    assert!(h.speaker.spoken().is_empty());
    assert_eq!(h.coach.stats().cues_delivered, 0);
}

#[tokio::test(start_paused = true)]
async fn question_while_stopped_is_dropped() {
    let h = harness(Reply::Echo);
    let outcome = h.coach.submit_utterance("how was that").await;
    assert_eq!(
        outcome,
        UtteranceOutcome::Cue {
            intent: Intent::QuestionForCoach,
            result: CueOutcome::Dropped(DropReason::SessionInactive),
        }
    );
    assert!(h.client.requests().is_empty());
}

// ============================================================================
// Utterance routing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn direct_commands_run_locally() {
    let h = harness(Reply::Echo);
    h.coach.start_session();

    let outcome = h.coach.submit_utterance("pause for a second").await;
    assert_eq!(outcome, UtteranceOutcome::Command { command: DirectCommand::Pause });
    assert_eq!(h.coach.session_state(), SessionState::Paused);

    let outcome = h.coach.submit_utterance("please stop now").await;
    assert_eq!(outcome, UtteranceOutcome::Command { command: DirectCommand::End });
    assert_eq!(h.coach.session_state(), SessionState::Stopped);

    assert!(h.client.requests().is_empty(), "commands never reach the coach");
}

#[tokio::test(start_paused = true)]
async fn chatter_and_silence_are_ignored() {
    let h = harness(Reply::Echo);
    h.coach.start_session();

    assert_eq!(
        h.coach.submit_utterance("nice weather today").await,
        UtteranceOutcome::Ignored { intent: Intent::Unknown }
    );
    assert_eq!(
        h.coach.submit_utterance("   ").await,
        UtteranceOutcome::Ignored { intent: Intent::Silence }
    );
    assert!(h.client.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn listening_routes_heard_transcript() {
    let h = harness(Reply::Echo);
    h.coach.start_session();

    h.transcripts.send("end the workout".into()).await.unwrap();
    let outcome = h.coach.listen_for_command().await.unwrap();
    assert_eq!(outcome, UtteranceOutcome::Command { command: DirectCommand::End });
    assert_eq!(h.coach.audio_mode(), AudioMode::Idle);

    // Nothing said within the window.
    let outcome = h.coach.listen_for_command().await.unwrap();
    assert_eq!(outcome, UtteranceOutcome::Ignored { intent: Intent::Silence });
}

#[tokio::test(start_paused = true)]
async fn listening_refused_while_speaking() {
    let h = harness(Reply::Echo);
    let lease = h.arbiter.request_speak().unwrap();

    let err = h.coach.listen_for_command().await.unwrap_err();
    assert!(matches!(err, SpeechError::Busy(_)));
    drop(lease);
    assert_eq!(h.coach.audio_mode(), AudioMode::Idle);
}

// ============================================================================
// Announcements and observation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn start_is_announced_when_enabled() {
    let mut config = test_config();
    config.session.announce_transitions = true;
    let h = harness_with(config, ScriptedClient::new(Reply::Echo, "Go"));

    h.coach.start_session();
    run_for(10).await;
    assert_eq!(h.speaker.spoken(), vec![ANNOUNCE_START]);
}

#[tokio::test(start_paused = true)]
async fn observers_see_delivered_cues() {
    let h = harness(Reply::Echo);
    let mut rx = h.coach.subscribe();
    h.coach.start_session();

    let snapshot = rx
        .wait_for(|s| s.last_cue.is_some())
        .await
        .map(|s| s.clone())
        .unwrap();
    assert_eq!(snapshot.session, SessionState::Active);
    assert_eq!(snapshot.last_cue.unwrap().text, "Nice pace, keep it up.");
    assert_eq!(snapshot.motion_source, "manual");
    assert_eq!(snapshot.perception_backend, "scripted");
    assert_eq!(snapshot.coaching_client, "scripted");
}
