//! Weight tuner — exhaustive grid search over the weight simplex.
//!
//! The grid is enumerated in whole percentage points: `time` and `pillar`
//! are the free dimensions, `parental` is the remainder, and all three must
//! lie within [floor, ceil]. Each grid point is scored by separation:
//!
//!   mean(composite | similar) − mean(composite | dissimilar)
//!
//! Evaluation fans out over a fixed rayon pool; the reduction runs once,
//! sequentially, in grid order. Tie-break: closest (L1, in points) to the
//! previously accepted vector, then earliest grid position. The same
//! corpus and grid always select the same vector.
//!
//! RULE: this is a brute-force search. Do not replace it with an
//! iterative optimiser; the enumerable grid is what makes a tuned vector
//! auditable.

use crate::{
    cancel::CancelToken,
    composite::{CompositeScorer, SubScores},
    config::{TunerConfig, WeightVector},
    error::{ResonanceError, ResonanceResult},
    types::EntityId,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Separations closer than this are treated as tied.
const TIE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPair {
    pub subject_id:       EntityId,
    pub candidate_id:     EntityId,
    pub sub_scores:       SubScores,
    pub is_known_similar: bool,
}

/// One point of the search grid, in whole percentage points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    pub time:     u32,
    pub pillar:   u32,
    pub parental: u32,
}

impl GridPoint {
    pub fn weights(&self) -> WeightVector {
        WeightVector::from_points(self.time, self.pillar, self.parental)
    }

    fn distance_to(&self, other: (u32, u32, u32)) -> u32 {
        self.time.abs_diff(other.0) + self.pillar.abs_diff(other.1) + self.parental.abs_diff(other.2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningOutcome {
    pub point:            GridPoint,
    pub weights:          WeightVector,
    pub separation_score: f64,
    pub evaluated:        usize,
    pub similar_pairs:    usize,
    pub dissimilar_pairs: usize,
}

pub struct WeightTuner {
    config: TunerConfig,
    scorer: CompositeScorer,
}

impl WeightTuner {
    pub fn new(config: TunerConfig, scorer: CompositeScorer) -> Self {
        Self { config, scorer }
    }

    /// Every admissible grid point, in enumeration order.
    pub fn grid(&self) -> Vec<GridPoint> {
        let TunerConfig { step_pct, floor_pct, ceil_pct, .. } = self.config;
        let step = step_pct.max(1) as usize;
        let mut points = Vec::new();
        for time in (floor_pct..=ceil_pct).step_by(step) {
            for pillar in (floor_pct..=ceil_pct).step_by(step) {
                let Some(parental) = 100u32.checked_sub(time + pillar) else {
                    continue;
                };
                if (floor_pct..=ceil_pct).contains(&parental) {
                    points.push(GridPoint { time, pillar, parental });
                }
            }
        }
        points
    }

    /// Separation for one weight vector. `None` when a label class is empty.
    pub fn separation(&self, weights: &WeightVector, corpus: &[LabeledPair]) -> Option<f64> {
        let (mut sim_sum, mut sim_n, mut dis_sum, mut dis_n) = (0.0, 0usize, 0.0, 0usize);
        for pair in corpus {
            let s = self.scorer.score(weights, &pair.sub_scores);
            if pair.is_known_similar {
                sim_sum += s;
                sim_n += 1;
            } else {
                dis_sum += s;
                dis_n += 1;
            }
        }
        if sim_n == 0 || dis_n == 0 {
            return None;
        }
        Some(sim_sum / sim_n as f64 - dis_sum / dis_n as f64)
    }

    /// Search the grid and return the best vector.
    ///
    /// Fails with `InsufficientSamples` when either label class is empty;
    /// the caller keeps its current vector in that case.
    pub fn tune(
        &self,
        corpus: &[LabeledPair],
        previous: Option<&WeightVector>,
        cancel: &CancelToken,
    ) -> ResonanceResult<TuningOutcome> {
        let similar = corpus.iter().filter(|p| p.is_known_similar).count();
        let dissimilar = corpus.len() - similar;
        if similar == 0 || dissimilar == 0 {
            return Err(ResonanceError::InsufficientSamples { similar, dissimilar });
        }

        let grid = self.grid();
        if grid.is_empty() {
            return Err(ResonanceError::InvalidConfig {
                reason: format!("weight grid {:?} has no admissible points", self.config),
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()
            .map_err(|e| ResonanceError::WorkerPool(e.to_string()))?;

        let separations: Vec<f64> = pool.install(|| {
            grid.par_iter()
                .map(|point| -> ResonanceResult<f64> {
                    cancel.check()?;
                    self.separation(&point.weights(), corpus).ok_or(
                        ResonanceError::InsufficientSamples { similar, dissimilar },
                    )
                })
                .collect::<ResonanceResult<Vec<f64>>>()
        })?;

        let anchor = previous.map(WeightVector::to_points);
        let best = select_best(&grid, &separations, anchor);
        let point = grid[best];

        log::debug!(
            "tuner: evaluated {} grid points, best {}/{}/{} separation={:.4}",
            grid.len(), point.time, point.pillar, point.parental, separations[best]
        );

        Ok(TuningOutcome {
            point,
            weights: point.weights(),
            separation_score: separations[best],
            evaluated: grid.len(),
            similar_pairs: similar,
            dissimilar_pairs: dissimilar,
        })
    }
}

/// Sequential reducer over evaluated points. `grid` and `separations`
/// are index-aligned and non-empty.
fn select_best(grid: &[GridPoint], separations: &[f64], anchor: Option<(u32, u32, u32)>) -> usize {
    let distance = |i: usize| anchor.map(|a| grid[i].distance_to(a)).unwrap_or(0);
    let mut best = 0;
    for i in 1..grid.len() {
        let delta = separations[i] - separations[best];
        if delta > TIE_EPSILON {
            best = i;
        } else if delta.abs() <= TIE_EPSILON && distance(i) < distance(best) {
            best = i;
        }
    }
    best
}
