//! Coaching backend clients
//!
//! - `HttpCoachingClient`: JSON over HTTP to `{base_url}/cognitive-core/infer`
//! - `OfflineCoach`: template rules over the request itself, for running
//!   without a backend

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::TransportError;
use crate::config::defaults::BACKEND_INFER_PATH;
use crate::config::{BackendConfig, UserConfig};
use crate::intent::Intent;
use crate::types::{
    CoachingRequest, CoachingResponse, CorrelationId, MotionDataWire, MotionMetricsWire,
    PerceptionState, SessionStateWire, UserStateWire, UserUtteranceWire,
};

/// Coaching inference capability.
#[async_trait]
pub trait CoachingClient: Send + Sync {
    /// Send one request and await its response. Failures are reported once;
    /// the client never retries.
    async fn infer(&self, request: &CoachingRequest) -> Result<CoachingResponse, TransportError>;

    /// Get the client name for logging
    fn client_name(&self) -> &'static str;
}

// ============================================================================
// Request construction
// ============================================================================

/// Inputs of one coaching request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub perception: &'a PerceptionState,
    pub user: &'a UserConfig,
    pub utterance: &'a str,
    pub intent: Intent,
    pub since_last_cue: Duration,
}

/// Build a request with a fresh correlation id, stamped now.
pub fn build_request(ctx: RequestContext<'_>) -> CoachingRequest {
    let p = ctx.perception;
    CoachingRequest {
        correlation_id: CorrelationId::new(),
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
        user_state: UserStateWire {
            physical_fatigue: f64::from(p.fatigue_level),
            mental_focus: ctx.user.mental_focus,
            consecutive_form_errors: p.consecutive_form_errors,
        },
        motion_data: MotionDataWire {
            exercise_id: p.exercise.wire_id().to_string(),
            rep_count_total: p.rep_count,
            current_set_target_reps: ctx.user.current_set_target_reps,
            form_error_detected: p.form_error_label().to_string(),
            // Not measured yet; the backend treats zero as "no change".
            metrics: MotionMetricsWire {
                jitter_percent_increase: 0.0,
                velocity_percent_decrease: 0.0,
            },
            uncertainty_score: ctx.user.uncertainty_score,
        },
        user_utterance: UserUtteranceWire {
            transcribed_text: ctx.utterance.to_string(),
            intent: ctx.intent.as_wire_str().to_string(),
        },
        session_state: SessionStateWire {
            time_since_last_cue_ms: u64::try_from(ctx.since_last_cue.as_millis()).unwrap_or(u64::MAX),
        },
    }
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct HttpCoachingClient {
    http: reqwest::Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl HttpCoachingClient {
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                BACKEND_INFER_PATH
            ),
            bearer_token: config.bearer_token().map(str::to_string),
        })
    }

    /// Full inference URL, for logging
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CoachingClient for HttpCoachingClient {
    async fn infer(&self, request: &CoachingRequest) -> Result<CoachingResponse, TransportError> {
        let mut req = self.http.post(&self.endpoint).json(request);
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }

        let body = resp.bytes().await?;
        let response: CoachingResponse = serde_json::from_slice(&body)?;
        debug!(
            id = %request.correlation_id,
            reasoning_steps = response.reasoning().len(),
            "[CoachingClient] Response received"
        );
        Ok(response)
    }

    fn client_name(&self) -> &'static str {
        "http"
    }
}

// ============================================================================
// Offline coach
// ============================================================================

/// Fatigue above which the offline coach suggests easing off.
const HIGH_FATIGUE: f64 = 0.7;

/// Consecutive needs-work inferences before a posture reset cue.
const PERSISTENT_FORM_ERRORS: u32 = 3;

/// Rule-based coach answering from the request alone. Always echoes the
/// correlation id. An empty `text_to_speak` means "nothing worth saying".
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCoach;

impl OfflineCoach {
    pub fn new() -> Self {
        Self
    }

    /// Pick a cue and the rules that led to it.
    pub fn respond(&self, request: &CoachingRequest) -> (String, Vec<String>) {
        let motion = &request.motion_data;
        let user = &request.user_state;
        let form_error = motion.form_error_detected == "generic";
        let reps = motion.rep_count_total;
        let target = motion.current_set_target_reps;
        let text = request.user_utterance.transcribed_text.to_lowercase();

        if request.user_utterance.intent == Intent::QuestionForCoach.as_wire_str() {
            if text.contains("how many") || text.contains("reps left") {
                let reply = if reps >= target {
                    format!("That's {reps}. Set complete!")
                } else {
                    format!("You've done {reps}. {} to go.", target - reps)
                };
                return (reply, vec![format!("progress question: {reps}/{target} reps")]);
            }
            let reply = if form_error {
                "Your form is slipping. Slow down and control each rep."
            } else {
                "Form looks solid. Keep it up."
            };
            return (reply.to_string(), vec![format!("form question: error={form_error}")]);
        }

        if user.consecutive_form_errors >= PERSISTENT_FORM_ERRORS {
            return (
                "Reset your posture. Stand tall and start the next rep slowly.".to_string(),
                vec![format!("{} consecutive form errors", user.consecutive_form_errors)],
            );
        }
        if form_error {
            return (
                "Watch your form. Smooth and controlled.".to_string(),
                vec!["form error detected".to_string()],
            );
        }
        if user.physical_fatigue > HIGH_FATIGUE {
            return (
                "You're tiring. Take a breath and ease the pace.".to_string(),
                vec![format!("fatigue {:.2} above {HIGH_FATIGUE}", user.physical_fatigue)],
            );
        }
        if target > 0 && reps >= target {
            return (
                "Set complete. Shake it out.".to_string(),
                vec![format!("{reps} reps reached target {target}")],
            );
        }
        if reps > 0 && reps % 5 == 0 {
            return (
                format!("{reps} reps. Nice rhythm."),
                vec![format!("rep milestone {reps}")],
            );
        }
        (String::new(), vec!["no cue warranted".to_string()])
    }
}

#[async_trait]
impl CoachingClient for OfflineCoach {
    async fn infer(&self, request: &CoachingRequest) -> Result<CoachingResponse, TransportError> {
        let (text, reasoning) = self.respond(request);
        Ok(CoachingResponse::reply(request.correlation_id, text, reasoning))
    }

    fn client_name(&self) -> &'static str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Exercise, FormQuality};

    fn request(perception: &PerceptionState, utterance: &str, intent: Intent) -> CoachingRequest {
        build_request(RequestContext {
            perception,
            user: &UserConfig::default(),
            utterance,
            intent,
            since_last_cue: Duration::from_millis(8_500),
        })
    }

    #[test]
    fn request_matches_wire_schema() {
        let perception = PerceptionState {
            exercise: Exercise::StepTouch,
            form_quality: FormQuality::NeedsWork,
            rep_count: 7,
            fatigue_level: 0.5,
            consecutive_form_errors: 2,
            ..PerceptionState::default()
        };
        let req = request(&perception, "", Intent::Silence);
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["transaction_id"], req.correlation_id.to_string());
        assert_eq!(json["user_state"]["physical_fatigue"], 0.5);
        assert_eq!(json["user_state"]["consecutive_form_errors"], 2);
        assert_eq!(json["motion_data"]["exercise_id"], "step_touch");
        assert_eq!(json["motion_data"]["rep_count_total"], 7);
        assert_eq!(json["motion_data"]["current_set_target_reps"], 20);
        assert_eq!(json["motion_data"]["form_error_detected"], "generic");
        assert_eq!(json["motion_data"]["metrics"]["jitter_percent_increase"], 0.0);
        assert_eq!(json["user_utterance"]["intent"], "silence");
        assert_eq!(json["session_state"]["time_since_last_cue_ms"], 8500);
        assert!(json["timestamp_ms"].as_i64().unwrap() > 0);
    }

    #[test]
    fn every_request_gets_a_fresh_id() {
        let p = PerceptionState::default();
        assert_ne!(
            request(&p, "", Intent::Silence).correlation_id,
            request(&p, "", Intent::Silence).correlation_id
        );
    }

    #[tokio::test]
    async fn offline_coach_echoes_id() {
        let req = request(&PerceptionState::default(), "", Intent::Silence);
        let resp = OfflineCoach::new().infer(&req).await.unwrap();
        assert_eq!(resp.correlation_id(), Some(req.correlation_id));
        assert_eq!(resp.text(), "", "nothing to say about an idle user");
    }

    #[test]
    fn offline_coach_answers_progress_questions() {
        let p = PerceptionState {
            rep_count: 12,
            ..PerceptionState::default()
        };
        let req = request(&p, "how many reps left", Intent::QuestionForCoach);
        assert_eq!(OfflineCoach.respond(&req).0, "You've done 12. 8 to go.");
    }

    #[test]
    fn offline_coach_prioritizes_persistent_form_errors() {
        let p = PerceptionState {
            form_quality: FormQuality::NeedsWork,
            consecutive_form_errors: 3,
            fatigue_level: 0.9,
            ..PerceptionState::default()
        };
        let (text, reasoning) = OfflineCoach.respond(&request(&p, "", Intent::Silence));
        assert!(text.starts_with("Reset your posture"));
        assert_eq!(reasoning, vec!["3 consecutive form errors".to_string()]);
    }

    #[test]
    fn offline_coach_flags_fatigue_and_milestones() {
        let tired = PerceptionState {
            fatigue_level: 0.8,
            ..PerceptionState::default()
        };
        assert!(OfflineCoach.respond(&request(&tired, "", Intent::Silence)).0.contains("tiring"));

        let milestone = PerceptionState {
            rep_count: 10,
            ..PerceptionState::default()
        };
        assert_eq!(
            OfflineCoach.respond(&request(&milestone, "", Intent::Silence)).0,
            "10 reps. Nice rhythm."
        );
    }

    #[test]
    fn http_client_builds_endpoint_without_double_slash() {
        let client = HttpCoachingClient::new(&BackendConfig {
            base_url: "http://coach.local:8080/".to_string(),
            ..BackendConfig::default()
        })
        .unwrap();
        assert_eq!(client.endpoint(), "http://coach.local:8080/cognitive-core/infer");
    }
}
