//! Per-window presence decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DetectError;
use crate::runner::WindowScore;

/// Decision for one window. Times are in seconds at full precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub index: usize,
    pub t_start: f64,
    pub t_end: f64,
    pub decision: bool,
    pub probability: f32,
}

impl fmt::Display for PredictionRecord {
    /// `time=<start>-<end>, pred=<0|1>, prob=<p>` with times rounded to 2 decimals.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "time={:.2}-{:.2}, pred={}, prob={}",
            self.t_start,
            self.t_end,
            u8::from(self.decision),
            self.probability
        )
    }
}

/// Softmax probability of class 1, computed with the max subtracted.
///
/// `None` for fewer than two classes or non-finite scores.
pub fn positive_probability(scores: &[f32]) -> Option<f32> {
    if scores.len() < 2 || scores.iter().any(|s| !s.is_finite()) {
        return None;
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = scores.iter().map(|s| (s - max).exp()).sum();
    Some((scores[1] - max).exp() / sum)
}

/// Turns window scores into [`PredictionRecord`]s. Stateless.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionAggregator {
    threshold: f32,
    sample_rate: u32,
}

impl DecisionAggregator {
    pub fn new(threshold: f32, sample_rate: u32) -> Self {
        Self {
            threshold,
            sample_rate,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn decide(&self, score: &WindowScore) -> Result<PredictionRecord, DetectError> {
        let probability = positive_probability(&score.scores).ok_or_else(|| {
            DetectError::Model(format!(
                "window {}: unusable scores {:?}",
                score.window.index, score.scores
            ))
        })?;
        let sr = self.sample_rate as f64;
        Ok(PredictionRecord {
            index: score.window.index,
            t_start: score.window.start as f64 / sr,
            t_end: score.window.end as f64 / sr,
            decision: probability >= self.threshold,
            probability,
        })
    }
}
