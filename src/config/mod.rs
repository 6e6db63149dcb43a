//! Coach Configuration Module
//!
//! Per-deployment configuration loaded from TOML files.
//!
//! ## Loading Order
//!
//! 1. `CHIMERA_CONFIG` environment variable (path to TOML file)
//! 2. `coach_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! The binary calls `config::init()` once at startup and reads it back with
//! `config::get()`. Library components take their config section by value so
//! tests and embedders never need the global.
//!
//! ```ignore
//! config::init(CoachConfig::load());
//! let min_interval = config::get().session.min_cue_interval();
//! ```

mod coach_config;
pub mod defaults;
pub mod validation;

pub use coach_config::*;

use std::sync::OnceLock;

static COACH_CONFIG: OnceLock<CoachConfig> = OnceLock::new();

/// Initialize the global configuration. Later calls are ignored with a warning.
pub fn init(config: CoachConfig) {
    if COACH_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Global configuration, or the built-in defaults if `init()` was never called.
pub fn get() -> &'static CoachConfig {
    COACH_CONFIG.get_or_init(CoachConfig::default)
}

/// Whether `init()` (or a defaulting `get()`) has already populated the global.
pub fn is_initialized() -> bool {
    COACH_CONFIG.get().is_some()
}
