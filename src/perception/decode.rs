//! Tensor output decoding
//!
//! All-or-nothing: either every required tensor decodes or nothing does.

use std::collections::BTreeMap;

use super::{DecodeError, TensorOutputs, EXERCISE_LOGITS, FATIGUE, FORM_LOGITS, REP_PROBABILITY};
use crate::types::{Exercise, FormQuality};

/// Fully decoded inference outputs, not yet merged into session state.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedOutputs {
    pub exercise: Exercise,
    /// Clamped to [0, 1]
    pub fatigue: f32,
    pub rep_probability_mean: f32,
    pub form_quality: FormQuality,
    /// The four decoded tensors, verbatim
    pub tensors: BTreeMap<String, Vec<f32>>,
}

/// Decode the four required tensors.
pub fn decode(outputs: &TensorOutputs) -> Result<DecodedOutputs, DecodeError> {
    let exercise_logits = required(outputs, EXERCISE_LOGITS)?;
    let fatigue = required(outputs, FATIGUE)?;
    let rep_probability = required(outputs, REP_PROBABILITY)?;
    let form_logits = required(outputs, FORM_LOGITS)?;

    if form_logits.len() != FormQuality::CLASS_ORDER.len() {
        return Err(DecodeError::FormArity(form_logits.len()));
    }

    let rep_probability_mean =
        rep_probability.iter().sum::<f32>() / rep_probability.len() as f32;

    let tensors = [
        (EXERCISE_LOGITS, exercise_logits),
        (FATIGUE, fatigue),
        (REP_PROBABILITY, rep_probability),
        (FORM_LOGITS, form_logits),
    ]
    .into_iter()
    .map(|(name, values)| (name.to_string(), values.to_vec()))
    .collect();

    Ok(DecodedOutputs {
        exercise: Exercise::from_class_index(argmax(exercise_logits)),
        fatigue: fatigue[0].clamp(0.0, 1.0),
        rep_probability_mean,
        form_quality: FormQuality::from_class_index(argmax(form_logits)),
        tensors,
    })
}

/// Fetch a tensor, rejecting absent, empty or non-finite ones.
fn required<'a>(outputs: &'a TensorOutputs, name: &'static str) -> Result<&'a [f32], DecodeError> {
    let values = outputs.get(name).ok_or(DecodeError::MissingTensor(name))?;
    if values.is_empty() {
        return Err(DecodeError::EmptyTensor(name));
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(DecodeError::NonFinite {
            tensor: name,
            index,
        });
    }
    Ok(values)
}

/// Index of the largest value; ties resolve to the lowest index.
fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}
