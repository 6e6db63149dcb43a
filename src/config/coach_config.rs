//! Coach Configuration - every tunable of the coaching loop as TOML values
//!
//! Each section implements `Default` with the values in `defaults.rs`, so a
//! missing or partial config file behaves exactly like the built-in setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "CHIMERA_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "coach_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a coaching deployment.
///
/// Load with `CoachConfig::load()` which searches:
/// 1. `$CHIMERA_CONFIG` env var
/// 2. `./coach_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoachConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub sensors: SensorConfig,

    #[serde(default)]
    pub perception: PerceptionConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl CoachConfig {
    /// Load configuration using the standard search order, falling back to
    /// defaults when nothing usable is found.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded coach config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded coach config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys only warn; range violations fail.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Coach config saved");
        Ok(())
    }

    /// Reject values the coaching loop cannot run with. Every problem is
    /// reported at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Config loading / validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

/// Orchestrator timing and cue policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tick_interval_ms: u64,
    pub min_cue_interval_secs: f64,
    /// Speak start / pause / end / next-exercise announcements.
    pub announce_transitions: bool,
    pub listen_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: defaults::TICK_INTERVAL_MS,
            min_cue_interval_secs: defaults::MIN_CUE_INTERVAL_SECS,
            announce_transitions: true,
            listen_timeout_ms: defaults::LISTEN_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn min_cue_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_cue_interval_secs.max(0.0))
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }
}

/// Ring buffer and motion source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub window_len: usize,
    pub inertial_rate_hz: u32,
    pub pressure_interval_ms: u64,
    /// Playback speed multiplier for CSV replay (1.0 = recorded timing, 0 = no delay)
    pub replay_speed: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            window_len: defaults::WINDOW_LEN,
            inertial_rate_hz: defaults::INERTIAL_RATE_HZ,
            pressure_interval_ms: defaults::PRESSURE_INTERVAL_MS,
            replay_speed: 1.0,
        }
    }
}

impl SensorConfig {
    pub fn inertial_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.inertial_rate_hz.max(1)))
    }

    pub fn pressure_interval(&self) -> Duration {
        Duration::from_millis(self.pressure_interval_ms)
    }
}

/// Perception decoding policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub rep_threshold: f32,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            rep_threshold: defaults::REP_THRESHOLD,
        }
    }
}

/// Coaching backend endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Empty means no Authorization header.
    pub bearer_token: String,
    pub timeout_secs: u64,
    /// Use the built-in template coach instead of the HTTP backend.
    pub offline: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BACKEND_BASE_URL.to_string(),
            bearer_token: String::new(),
            timeout_secs: defaults::BACKEND_TIMEOUT_SECS,
            offline: false,
        }
    }
}

impl BackendConfig {
    pub fn bearer_token(&self) -> Option<&str> {
        let t = self.bearer_token.trim();
        (!t.is_empty()).then_some(t)
    }
}

/// Speech synthesis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub voice: String,
    pub rate: f32,
    pub volume: f32,
    pub words_per_minute: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: defaults::SPEECH_VOICE.to_string(),
            rate: defaults::SPEECH_RATE,
            volume: defaults::SPEECH_VOLUME,
            words_per_minute: defaults::SPEECH_WORDS_PER_MINUTE,
        }
    }
}

/// Static user-profile values carried in every coaching request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub current_set_target_reps: u32,
    pub mental_focus: f64,
    pub uncertainty_score: f64,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            current_set_target_reps: defaults::CURRENT_SET_TARGET_REPS,
            mental_focus: defaults::MENTAL_FOCUS,
            uncertainty_score: defaults::UNCERTAINTY_SCORE,
        }
    }
}

/// Control API listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
        }
    }
}
