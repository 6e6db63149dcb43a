//! Perception Adapter - snapshot in, merged PerceptionState out
//!
//! Failures never touch the state: a snapshot of the wrong length, a failing
//! backend and an undecodable output all leave the previous perception in
//! place.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use super::{decode, InferenceBackend, InputTensor, PerceptionError};
use crate::config::PerceptionConfig;
use crate::types::{FormQuality, PerceptionState, Sample};

struct Inner {
    state: PerceptionState,
    /// Bumped by `reset`; inferences started before a reset are discarded.
    generation: u64,
}

pub struct PerceptionAdapter {
    backend: Arc<dyn InferenceBackend>,
    window_len: usize,
    rep_threshold: f32,
    inner: Mutex<Inner>,
}

impl PerceptionAdapter {
    pub fn new(backend: Arc<dyn InferenceBackend>, window_len: usize, config: &PerceptionConfig) -> Self {
        Self {
            backend,
            window_len,
            rep_threshold: config.rep_threshold,
            inner: Mutex::new(Inner {
                state: PerceptionState::default(),
                generation: 0,
            }),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Current perception (a copy).
    pub fn state(&self) -> PerceptionState {
        self.lock().state.clone()
    }

    /// Back to defaults: unknown exercise and form, zero reps, zero fatigue.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = PerceptionState::default();
        inner.generation += 1;
        self.backend.reset();
    }

    /// Run one inference over `snapshot` and merge the result.
    ///
    /// A rep is counted when the mean rep probability exceeds the threshold;
    /// each call adds at most one.
    pub async fn infer(&self, snapshot: &[Sample]) -> Result<PerceptionState, PerceptionError> {
        if snapshot.len() != self.window_len {
            debug!(
                expected = self.window_len,
                actual = snapshot.len(),
                "[Perception] Snapshot length mismatch, skipping"
            );
            return Err(PerceptionError::InsufficientData {
                expected: self.window_len,
                actual: snapshot.len(),
            });
        }

        let generation = self.lock().generation;
        let input = InputTensor::from_snapshot(snapshot);

        let outputs = self.backend.run(&input).await.map_err(|e| {
            warn!(backend = self.backend.backend_name(), error = %e, "[Perception] Backend failed");
            PerceptionError::Backend(e)
        })?;

        let decoded = decode(&outputs).map_err(|e| {
            warn!(error = %e, "[Perception] Decode failed, keeping previous state");
            PerceptionError::Decode(e)
        })?;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!("[Perception] Discarding inference started before reset");
            return Err(PerceptionError::Superseded);
        }

        let state = &mut inner.state;
        state.exercise = decoded.exercise;
        state.form_quality = decoded.form_quality;
        state.fatigue_level = decoded.fatigue;
        if decoded.rep_probability_mean > self.rep_threshold {
            state.rep_count = state.rep_count.saturating_add(1);
        }
        state.consecutive_form_errors = if decoded.form_quality == FormQuality::NeedsWork {
            state.consecutive_form_errors.saturating_add(1)
        } else {
            0
        };
        state.inferences += 1;
        state.debug_tensors = decoded.tensors;

        debug!(
            exercise = %state.exercise,
            form = %state.form_quality,
            reps = state.rep_count,
            fatigue = state.fatigue_level,
            "[Perception] State updated"
        );
        Ok(state.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::{TensorOutputs, EXERCISE_LOGITS, FATIGUE, FORM_LOGITS, REP_PROBABILITY};
    use crate::types::Exercise;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend returning a fixed output (or failing).
    struct FixedBackend(Option<TensorOutputs>);

    #[async_trait]
    impl InferenceBackend for FixedBackend {
        async fn run(&self, _input: &InputTensor) -> anyhow::Result<TensorOutputs> {
            self.0.clone().ok_or_else(|| anyhow::anyhow!("model unavailable"))
        }

        fn backend_name(&self) -> &'static str {
            "fixed"
        }
    }

    /// Backend returning queued outputs in order, failing once drained.
    struct SequenceBackend(Mutex<VecDeque<TensorOutputs>>);

    #[async_trait]
    impl InferenceBackend for SequenceBackend {
        async fn run(&self, _input: &InputTensor) -> anyhow::Result<TensorOutputs> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("sequence exhausted"))
        }

        fn backend_name(&self) -> &'static str {
            "sequence"
        }
    }

    fn outputs(rep: Vec<f32>, form: Vec<f32>) -> TensorOutputs {
        TensorOutputs::new()
            .with(EXERCISE_LOGITS, vec![0.0, 0.0, 4.0, 0.0, 0.0])
            .with(FATIGUE, vec![0.25])
            .with(REP_PROBABILITY, rep)
            .with(FORM_LOGITS, form)
    }

    fn adapter(out: Option<TensorOutputs>) -> PerceptionAdapter {
        PerceptionAdapter::new(Arc::new(FixedBackend(out)), 10, &PerceptionConfig::default())
    }

    fn window() -> Vec<Sample> {
        vec![Sample::ZERO; 10]
    }

    #[tokio::test]
    async fn rep_mean_above_threshold_adds_exactly_one_per_call() {
        let a = adapter(Some(outputs(vec![0.6; 8], vec![1.0, 0.0, 0.0])));
        for expected in 1..=3 {
            let state = a.infer(&window()).await.unwrap();
            assert_eq!(state.rep_count, expected);
        }
        assert_eq!(a.state().exercise, Exercise::StepTouch);
        assert_eq!(a.state().fatigue_level, 0.25);
        assert_eq!(a.state().inferences, 3);
    }

    #[tokio::test]
    async fn rep_mean_at_threshold_does_not_count() {
        let a = adapter(Some(outputs(vec![0.4, 0.6], vec![1.0, 0.0, 0.0])));
        assert_eq!(a.infer(&window()).await.unwrap().rep_count, 0);
    }

    #[tokio::test]
    async fn wrong_length_is_insufficient_data_and_state_unchanged() {
        let a = adapter(Some(outputs(vec![0.9], vec![1.0, 0.0, 0.0])));
        a.infer(&window()).await.unwrap();
        let before = a.state();

        let err = a.infer(&vec![Sample::ZERO; 9]).await.unwrap_err();
        assert!(matches!(
            err,
            PerceptionError::InsufficientData { expected: 10, actual: 9 }
        ));
        assert_eq!(a.state(), before);
    }

    #[tokio::test]
    async fn decode_failure_keeps_previous_state() {
        let a = adapter(Some(outputs(vec![0.9], vec![1.0, 0.0])));
        let err = a.infer(&window()).await.unwrap_err();
        assert!(matches!(err, PerceptionError::Decode(_)));
        assert_eq!(a.state(), PerceptionState::default());
    }

    #[tokio::test]
    async fn backend_failure_is_reported() {
        let a = adapter(None);
        assert!(matches!(
            a.infer(&window()).await,
            Err(PerceptionError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn consecutive_form_errors_reset_on_good_form() {
        let needs_work = outputs(vec![0.0], vec![0.0, 1.0, 0.0]);
        let good = outputs(vec![0.0], vec![0.0, 0.0, 1.0]);
        let queue = VecDeque::from(vec![needs_work.clone(), needs_work.clone(), good, needs_work]);
        let a = PerceptionAdapter::new(
            Arc::new(SequenceBackend(Mutex::new(queue))),
            10,
            &PerceptionConfig::default(),
        );

        a.infer(&window()).await.unwrap();
        let state = a.infer(&window()).await.unwrap();
        assert_eq!(state.form_quality, FormQuality::NeedsWork);
        assert_eq!(state.consecutive_form_errors, 2);
        assert_eq!(state.form_error_label(), "generic");

        let state = a.infer(&window()).await.unwrap();
        assert_eq!(state.form_quality, FormQuality::Good);
        assert_eq!(state.consecutive_form_errors, 0);

        let state = a.infer(&window()).await.unwrap();
        assert_eq!(state.consecutive_form_errors, 1, "count restarts after the reset");
    }

    #[tokio::test]
    async fn reset_restores_defaults() {
        let a = adapter(Some(outputs(vec![0.9], vec![1.0, 0.0, 0.0])));
        a.infer(&window()).await.unwrap();
        a.reset();
        assert_eq!(a.state(), PerceptionState::default());
    }
}
