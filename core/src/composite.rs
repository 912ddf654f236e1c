//! Composite scorer — weighted sum of heterogeneous sub-scores.
//!
//! The time sub-score is always present. Structural sub-scores (pillar,
//! parental) are optional; an absent one is replaced by the configured
//! neutral midpoint, never by zero. Output is clamped to [0, 100].

use crate::config::{CompositeConfig, WeightVector};
use serde::{Deserialize, Serialize};

/// Sub-scores for one pair, each on a 0..=100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub time:     f64,
    pub pillar:   Option<f64>,
    pub parental: Option<f64>,
}

impl SubScores {
    pub fn time_only(time: f64) -> Self {
        Self { time, pillar: None, parental: None }
    }
}

#[derive(Debug, Clone)]
pub struct CompositeScorer {
    neutral: f64,
}

impl CompositeScorer {
    pub fn new(config: &CompositeConfig) -> Self {
        Self { neutral: config.neutral_subscore }
    }

    pub fn neutral(&self) -> f64 {
        self.neutral
    }

    pub fn score(&self, weights: &WeightVector, subs: &SubScores) -> f64 {
        let pillar = subs.pillar.unwrap_or(self.neutral);
        let parental = subs.parental.unwrap_or(self.neutral);
        let total = weights.time * subs.time + weights.pillar * pillar + weights.parental * parental;
        total.clamp(0.0, 100.0)
    }
}
