//! Session lifecycle and audio mode enums

use serde::{Deserialize, Serialize};

/// Workout session lifecycle.
///
/// `Stopped` is both the initial and the terminal state of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Stopped,
    Active,
    Paused,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        self == SessionState::Active
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Stopped => write!(f, "Stopped"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Paused => write!(f, "Paused"),
        }
    }
}

/// Audio pipeline mode. Exactly one value at any instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    #[default]
    Idle,
    Listening,
    Speaking,
}

impl std::fmt::Display for AudioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioMode::Idle => write!(f, "idle"),
            AudioMode::Listening => write!(f, "listening"),
            AudioMode::Speaking => write!(f, "speaking"),
        }
    }
}
