//! Heuristic motion model
//!
//! Built-in [`InferenceBackend`] that derives the four output tensors from
//! window statistics instead of a trained network, so the coach runs end to
//! end without model weights.
//!
//! - Exercise: which axis carries the most variance; a near-still window
//!   scores an extra "resting" class that decodes to `unknown`.
//! - Reps: probability that each recent step sits above the window's mean
//!   acceleration magnitude (standard normal CDF of its z-score).
//! - Fatigue: loss of movement amplitude against the session's first moving
//!   window.
//! - Form: jitter, the mean step-to-step gyro change relative to the gyro
//!   spread.

use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics;

use super::{InferenceBackend, InputTensor, TensorOutputs};
use super::{EXERCISE_LOGITS, FATIGUE, FORM_LOGITS, REP_PROBABILITY};
use crate::types::Channel;

/// Below this accel-magnitude std-dev (g) the user is considered still.
const STILLNESS_STD_G: f64 = 0.05;

/// Fraction of the window treated as "recent" for rep detection.
const RECENT_FRACTION: usize = 4;

pub struct HeuristicMotionModel {
    /// Movement amplitude of the first moving window this session.
    baseline_amplitude: Mutex<Option<f64>>,
}

impl HeuristicMotionModel {
    pub fn new() -> Self {
        Self {
            baseline_amplitude: Mutex::new(None),
        }
    }

    fn exercise_logits(input: &InputTensor, movement_std: f64) -> Vec<f32> {
        let var = |c: Channel| widen(input.channel(c)).variance();
        let scores = [
            var(Channel::AccelZ),                       // standing march
            var(Channel::GyroX) + var(Channel::GyroY),  // arm circles
            var(Channel::AccelY),                       // step touch
            var(Channel::AccelX),                       // wall push-up
            var(Channel::GyroZ),                        // seated extension
        ];
        let resting = if movement_std < STILLNESS_STD_G { 1.0 } else { 0.0 };

        scores
            .iter()
            .map(|s| sanitize(*s) as f32)
            .chain(std::iter::once(resting))
            .collect()
    }

    fn rep_probability(magnitude: &[f64]) -> Result<Vec<f32>> {
        let mean = magnitude.mean();
        let std = magnitude.std_dev();
        let recent = &magnitude[magnitude.len() - (magnitude.len() / RECENT_FRACTION).max(1)..];

        if !std.is_finite() || std < STILLNESS_STD_G {
            return Ok(vec![0.0; recent.len()]);
        }
        let unit = Normal::new(0.0, 1.0).context("standard normal")?;
        Ok(recent
            .iter()
            .map(|m| unit.cdf((m - mean) / std) as f32)
            .collect())
    }

    fn fatigue(&self, amplitude: f64) -> f32 {
        if amplitude < STILLNESS_STD_G {
            return 0.0;
        }
        let mut baseline = self
            .baseline_amplitude
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let base = *baseline.get_or_insert(amplitude);
        (1.0 - amplitude / base).clamp(0.0, 1.0) as f32
    }

    fn form_logits(gyro_magnitude: &[f64]) -> Vec<f32> {
        let spread = gyro_magnitude.std_dev();
        if !spread.is_finite() || spread < 1e-6 {
            return vec![0.0, 0.0, 1.0];
        }
        let mean_step = gyro_magnitude
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .mean();
        let jitter = (mean_step / spread) as f32;

        // [excellent, needs_work, good]
        vec![2.0 - 4.0 * jitter, 4.0 * jitter - 2.0, 0.5]
    }
}

impl Default for HeuristicMotionModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceBackend for HeuristicMotionModel {
    async fn run(&self, input: &InputTensor) -> Result<TensorOutputs> {
        anyhow::ensure!(input.steps() >= 2, "window too short: {} steps", input.steps());

        let accel_magnitude = magnitudes(input, [Channel::AccelX, Channel::AccelY, Channel::AccelZ]);
        let gyro_magnitude = magnitudes(input, [Channel::GyroX, Channel::GyroY, Channel::GyroZ]);
        let movement_std = sanitize(accel_magnitude.iter().std_dev());

        Ok(TensorOutputs::new()
            .with(EXERCISE_LOGITS, Self::exercise_logits(input, movement_std))
            .with(FATIGUE, vec![self.fatigue(movement_std)])
            .with(REP_PROBABILITY, Self::rep_probability(&accel_magnitude)?)
            .with(FORM_LOGITS, Self::form_logits(&gyro_magnitude)))
    }

    fn backend_name(&self) -> &'static str {
        "heuristic"
    }

    fn reset(&self) {
        *self
            .baseline_amplitude
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn widen(values: &[f32]) -> Vec<f64> {
    values.iter().map(|v| f64::from(*v)).collect()
}

fn magnitudes(input: &InputTensor, axes: [Channel; 3]) -> Vec<f64> {
    let [x, y, z] = axes.map(|c| input.channel(c));
    x.iter()
        .zip(y)
        .zip(z)
        .map(|((x, y), z)| f64::from(x * x + y * y + z * z).sqrt())
        .collect()
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::decode;
    use crate::types::{Exercise, FormQuality, Sample};

    fn marching_window(amplitude: f32, steps: usize) -> Vec<Sample> {
        (0..steps)
            .map(|t| {
                let phase = std::f32::consts::TAU * t as f32 / 100.0;
                let mut s = Sample::accel(0.0, 0.0, 1.0 + amplitude * phase.sin());
                s.set(Channel::GyroX, 0.2 * amplitude * phase.cos());
                s
            })
            .collect()
    }

    #[tokio::test]
    async fn still_window_decodes_to_unknown_without_reps() {
        let model = HeuristicMotionModel::new();
        let input = InputTensor::from_snapshot(&[Sample::accel(0.0, 0.0, 1.0); 50]);
        let decoded = decode(&model.run(&input).await.unwrap()).unwrap();
        assert_eq!(decoded.exercise, Exercise::Unknown);
        assert_eq!(decoded.rep_probability_mean, 0.0);
        assert_eq!(decoded.fatigue, 0.0);
    }

    #[tokio::test]
    async fn vertical_motion_is_standing_march_with_clean_form() {
        let model = HeuristicMotionModel::new();
        let input = InputTensor::from_snapshot(&marching_window(0.6, 300));
        let decoded = decode(&model.run(&input).await.unwrap()).unwrap();
        assert_eq!(decoded.exercise, Exercise::StandingMarch);
        assert_eq!(decoded.form_quality, FormQuality::Excellent);
        assert!((0.0..=1.0).contains(&decoded.rep_probability_mean));
    }

    #[tokio::test]
    async fn fatigue_rises_as_amplitude_drops_and_resets() {
        let model = HeuristicMotionModel::new();
        let fresh = InputTensor::from_snapshot(&marching_window(0.6, 300));
        let tired = InputTensor::from_snapshot(&marching_window(0.3, 300));

        let first = decode(&model.run(&fresh).await.unwrap()).unwrap();
        assert_eq!(first.fatigue, 0.0);
        let later = decode(&model.run(&tired).await.unwrap()).unwrap();
        assert!(later.fatigue > 0.4, "fatigue {}", later.fatigue);

        model.reset();
        let after_reset = decode(&model.run(&tired).await.unwrap()).unwrap();
        assert_eq!(after_reset.fatigue, 0.0);
    }

    #[tokio::test]
    async fn single_step_window_is_rejected() {
        let model = HeuristicMotionModel::new();
        let input = InputTensor::from_snapshot(&[Sample::ZERO]);
        assert!(model.run(&input).await.is_err());
    }
}
