//! Utterance intent classification
//!
//! Pure keyword rules over the lower-cased text, first match wins. Matching is
//! substring containment, so "stop" also matches "stopwatch".

use serde::{Deserialize, Serialize};

/// Closed set of utterance intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    DirectCommand,
    QuestionForCoach,
    /// Wire value only; no rule produces it.
    AmbientChatter,
    Silence,
    Unknown,
}

impl Intent {
    /// Name used in the coaching request's `user_utterance.intent`.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Intent::DirectCommand => "direct_command",
            Intent::QuestionForCoach => "question_for_coach",
            Intent::AmbientChatter => "ambient_chatter",
            Intent::Silence => "silence",
            Intent::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

/// Session commands executed locally without asking the coach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectCommand {
    End,
    Pause,
    NextExercise,
}

impl DirectCommand {
    /// Resolve a command with the same priority as [`classify`].
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.to_lowercase();
        if contains_any(&t, &["stop", "end"]) {
            Some(DirectCommand::End)
        } else if t.contains("pause") {
            Some(DirectCommand::Pause)
        } else if contains_any(&t, &["next", "skip"]) {
            Some(DirectCommand::NextExercise)
        } else {
            None
        }
    }
}

/// Classify an utterance.
pub fn classify(text: &str) -> Intent {
    let t = text.to_lowercase();
    if t.trim().is_empty() {
        return Intent::Silence;
    }
    if DirectCommand::parse(&t).is_some() {
        return Intent::DirectCommand;
    }
    if contains_any(&t, &["how many", "reps left"]) {
        return Intent::QuestionForCoach;
    }
    if (t.contains("form") && t.contains("how")) || t.contains("how was that") {
        return Intent::QuestionForCoach;
    }
    Intent::Unknown
}

/// Stateless classifier handle, for callers that want an injectable value.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn classify(&self, text: &str) -> Intent {
        classify(text)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
