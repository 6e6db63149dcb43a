//! Perception output types: Exercise, FormQuality, PerceptionState

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Exercise
// ============================================================================

/// Exercise classes known to the perception model, in logit index order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Exercise {
    StandingMarch,
    ArmCircles,
    StepTouch,
    WallPushup,
    SeatedExtension,
    #[default]
    Unknown,
}

impl Exercise {
    /// Known labels in model output order. `Unknown` is the fallback, not a class.
    pub const KNOWN: [Exercise; 5] = [
        Exercise::StandingMarch,
        Exercise::ArmCircles,
        Exercise::StepTouch,
        Exercise::WallPushup,
        Exercise::SeatedExtension,
    ];

    /// Map a logit index to an exercise, falling back to `Unknown`.
    pub fn from_class_index(index: usize) -> Self {
        Self::KNOWN.get(index).copied().unwrap_or(Exercise::Unknown)
    }

    /// Identifier used on the coaching wire protocol.
    pub fn wire_id(&self) -> &'static str {
        match self {
            Exercise::StandingMarch => "standing_march",
            Exercise::ArmCircles => "arm_circles",
            Exercise::StepTouch => "step_touch",
            Exercise::WallPushup => "wall_pushup",
            Exercise::SeatedExtension => "seated_extension",
            Exercise::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Exercise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exercise::StandingMarch => write!(f, "Standing March"),
            Exercise::ArmCircles => write!(f, "Arm Circles"),
            Exercise::StepTouch => write!(f, "Step Touch"),
            Exercise::WallPushup => write!(f, "Wall Push-up"),
            Exercise::SeatedExtension => write!(f, "Seated Extension"),
            Exercise::Unknown => write!(f, "Unknown"),
        }
    }
}

// ============================================================================
// Form Quality
// ============================================================================

/// Movement form grade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FormQuality {
    Excellent,
    Good,
    NeedsWork,
    #[default]
    Unknown,
}

impl FormQuality {
    /// Form logits index order: 0=excellent, 1=needs-work, 2=good.
    ///
    /// This is the model's output order and intentionally differs from the
    /// declaration order above.
    pub const CLASS_ORDER: [FormQuality; 3] =
        [FormQuality::Excellent, FormQuality::NeedsWork, FormQuality::Good];

    pub fn from_class_index(index: usize) -> Self {
        Self::CLASS_ORDER
            .get(index)
            .copied()
            .unwrap_or(FormQuality::Unknown)
    }
}

impl std::fmt::Display for FormQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormQuality::Excellent => write!(f, "Excellent"),
            FormQuality::Good => write!(f, "Good"),
            FormQuality::NeedsWork => write!(f, "Needs Work"),
            FormQuality::Unknown => write!(f, "Unknown"),
        }
    }
}

// ============================================================================
// Perception State
// ============================================================================

/// Latest decoded perception of the user's physical state.
///
/// Only the perception adapter mutates this, and only after a fully decoded
/// inference. Everyone else reads clones.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerceptionState {
    pub exercise: Exercise,
    pub form_quality: FormQuality,
    /// Monotonic within a session
    pub rep_count: u32,
    /// Always within [0, 1]
    pub fatigue_level: f32,
    /// Consecutive inferences graded `NeedsWork`
    pub consecutive_form_errors: u32,
    /// Completed inferences since session start
    pub inferences: u64,
    /// Raw decoded tensors from the last successful inference, keyed by tensor name
    pub debug_tensors: BTreeMap<String, Vec<f32>>,
}

impl PerceptionState {
    /// Wire value for `form_error_detected`.
    pub fn form_error_label(&self) -> &'static str {
        if self.form_quality == FormQuality::NeedsWork {
            "generic"
        } else {
            "none"
        }
    }
}
