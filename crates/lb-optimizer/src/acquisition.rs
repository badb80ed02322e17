//! Upper-confidence-bound acquisition.

use serde::{Deserialize, Serialize};

use crate::gp::Prediction;

/// Scores a candidate as `mean + beta * std`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpperConfidenceBound {
    pub beta: f64,
}

impl UpperConfidenceBound {
    pub fn new(beta: f64) -> Self {
        Self { beta }
    }

    pub fn score(&self, prediction: &Prediction) -> f64 {
        prediction.mean + self.beta * prediction.std
    }

    /// Index of the best-scoring prediction. Ties go to the lowest index.
    pub fn select(&self, predictions: &[Prediction]) -> Option<usize> {
        let scores: Vec<f64> = predictions.iter().map(|p| self.score(p)).collect();
        argmax_first(&scores)
    }
}

/// Index of the first maximum. NaN scores never win.
pub fn argmax_first(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}
