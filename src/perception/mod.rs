//! Perception Module
//!
//! Turns ring buffer snapshots into a [`PerceptionState`] via an inference
//! capability.
//!
//! ## Tensor contract
//!
//! - Input: one `f32` tensor of shape `[1, C, N]`, channel-major
//!   (`data[c * N + t]`), channels in [`Channel::ALL`] order.
//! - Outputs (all required): `exercise_logits`, `fatigue`, `rep_probability`,
//!   `form_logits` (exactly 3 values).
//!
//! [`PerceptionState`]: crate::types::PerceptionState

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Channel, Sample, CHANNEL_COUNT};

pub mod adapter;
pub mod decode;
pub mod heuristic;

pub use adapter::PerceptionAdapter;
pub use decode::{decode, DecodedOutputs};
pub use heuristic::HeuristicMotionModel;

pub const EXERCISE_LOGITS: &str = "exercise_logits";
pub const FATIGUE: &str = "fatigue";
pub const REP_PROBABILITY: &str = "rep_probability";
pub const FORM_LOGITS: &str = "form_logits";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("Insufficient data: expected {expected} samples, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Inference backend failed: {0:#}")]
    Backend(anyhow::Error),

    #[error("Failed to decode inference outputs: {0}")]
    Decode(#[from] DecodeError),

    /// The adapter was reset while this inference was running.
    #[error("Inference superseded by a perception reset")]
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Missing output tensor '{0}'")]
    MissingTensor(&'static str),

    #[error("Output tensor '{0}' is empty")]
    EmptyTensor(&'static str),

    #[error("Non-finite value in '{tensor}' at index {index}")]
    NonFinite { tensor: &'static str, index: usize },

    #[error("form_logits must have exactly 3 values, got {0}")]
    FormArity(usize),
}

// ============================================================================
// Tensors
// ============================================================================

/// Model input built from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    steps: usize,
    data: Vec<f32>,
}

impl InputTensor {
    /// Transpose a chronological snapshot into channel-major layout.
    pub fn from_snapshot(snapshot: &[Sample]) -> Self {
        let steps = snapshot.len();
        let mut data = vec![0.0; CHANNEL_COUNT * steps];
        for (t, sample) in snapshot.iter().enumerate() {
            for (c, value) in sample.0.iter().enumerate() {
                data[c * steps + t] = *value;
            }
        }
        Self { steps, data }
    }

    /// `[batch, channels, steps]`
    pub fn shape(&self) -> [usize; 3] {
        [1, CHANNEL_COUNT, self.steps]
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Time series of one channel, oldest first.
    pub fn channel(&self, channel: Channel) -> &[f32] {
        let start = channel.index() * self.steps;
        &self.data[start..start + self.steps]
    }
}

/// Named output tensors of one inference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorOutputs {
    tensors: BTreeMap<String, Vec<f32>>,
}

impl TensorOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, values: Vec<f32>) -> Self {
        self.insert(name, values);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f32>) {
        self.tensors.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.tensors.get(name).map(Vec::as_slice)
    }
}

/// Inference capability behind the perception adapter.
///
/// Any implementation honouring the tensor contract is acceptable (on-device
/// model, remote service, heuristic).
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one inference over a `[1, C, N]` input.
    async fn run(&self, input: &InputTensor) -> Result<TensorOutputs>;

    /// Get the backend name for logging
    fn backend_name(&self) -> &'static str;

    /// Drop any per-session state. Called when a new session starts.
    fn reset(&self) {}
}
