//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse: the raw TOML is walked as a `toml::Value` tree and compared
//! against the known key set, emitting "did you mean?" warnings. Normal serde
//! deserialization then proceeds. Unknown keys never break a config.

use std::collections::HashSet;

use super::CoachConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Complete set of valid dotted key paths for `CoachConfig`.
///
/// Must be kept in step with the structs in `coach_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        "session",
        "session.tick_interval_ms",
        "session.min_cue_interval_secs",
        "session.announce_transitions",
        "session.listen_timeout_ms",
        "sensors",
        "sensors.window_len",
        "sensors.inertial_rate_hz",
        "sensors.pressure_interval_ms",
        "sensors.replay_speed",
        "perception",
        "perception.rep_threshold",
        "backend",
        "backend.base_url",
        "backend.bearer_token",
        "backend.timeout_secs",
        "backend.offline",
        "speech",
        "speech.voice",
        "speech.rate",
        "speech.volume",
        "speech.words_per_minute",
        "user",
        "user.current_set_target_reps",
        "user.mental_focus",
        "user.uncertainty_score",
        "server",
        "server.addr",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collect all dotted key paths of a `toml::Value` tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Warnings for every unknown key in a raw TOML document.
///
/// Parse errors yield no warnings; serde reports them afterwards.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate ranges on a parsed config.
///
/// Returns (errors, warnings): errors are values the loop cannot run with,
/// warnings are suspicious but usable.
pub fn validate_ranges(config: &CoachConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let s = &config.session;
    if s.tick_interval_ms == 0 {
        errors.push("session.tick_interval_ms must be > 0".to_string());
    }
    if !s.min_cue_interval_secs.is_finite() || s.min_cue_interval_secs < 0.0 {
        errors.push(format!(
            "session.min_cue_interval_secs = {} must be a non-negative number",
            s.min_cue_interval_secs
        ));
    }
    if s.listen_timeout_ms == 0 {
        errors.push("session.listen_timeout_ms must be > 0".to_string());
    }

    let sensors = &config.sensors;
    if sensors.window_len < 2 {
        errors.push(format!(
            "sensors.window_len = {} must be at least 2",
            sensors.window_len
        ));
    }
    if !(1..=1000).contains(&sensors.inertial_rate_hz) {
        errors.push(format!(
            "sensors.inertial_rate_hz = {} is outside 1-1000 Hz",
            sensors.inertial_rate_hz
        ));
    }
    if sensors.pressure_interval_ms == 0 {
        errors.push("sensors.pressure_interval_ms must be > 0".to_string());
    }
    if !sensors.replay_speed.is_finite() || sensors.replay_speed < 0.0 {
        errors.push(format!(
            "sensors.replay_speed = {} must be >= 0",
            sensors.replay_speed
        ));
    }

    let rep = config.perception.rep_threshold;
    if !(rep > 0.0 && rep < 1.0) {
        errors.push(format!(
            "perception.rep_threshold = {rep} must be strictly between 0 and 1"
        ));
    }

    if config.backend.timeout_secs == 0 {
        errors.push("backend.timeout_secs must be > 0".to_string());
    }
    if !config.backend.offline
        && !(config.backend.base_url.starts_with("http://")
            || config.backend.base_url.starts_with("https://"))
    {
        errors.push(format!(
            "backend.base_url = '{}' must start with http:// or https://",
            config.backend.base_url
        ));
    }

    let speech = &config.speech;
    if !(0.0..=1.0).contains(&speech.volume) {
        errors.push(format!("speech.volume = {} is outside 0-1", speech.volume));
    }
    if !(0.0..=1.0).contains(&speech.rate) {
        errors.push(format!("speech.rate = {} is outside 0-1", speech.rate));
    }
    if speech.words_per_minute == 0 {
        errors.push("speech.words_per_minute must be > 0".to_string());
    }

    // A cue interval shorter than the tick means every tick may speak.
    if s.tick_interval_ms > 0 && s.min_cue_interval_secs * 1000.0 < s.tick_interval_ms as f64 {
        warnings.push(ValidationWarning {
            field: "session.min_cue_interval_secs".to_string(),
            message: format!(
                "min_cue_interval_secs = {} is shorter than one tick ({} ms); proactive cues are effectively unthrottled",
                s.min_cue_interval_secs, s.tick_interval_ms
            ),
            suggestion: None,
        });
    }

    for (field, value) in [
        ("user.mental_focus", config.user.mental_focus),
        ("user.uncertainty_score", config.user.uncertainty_score),
    ] {
        if !(0.0..=1.0).contains(&value) {
            warnings.push(ValidationWarning {
                field: field.to_string(),
                message: format!("{field} = {value} is outside the usual 0-1 range"),
                suggestion: None,
            });
        }
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
