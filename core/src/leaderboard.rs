//! Leaderboard aggregator — pairwise scores to one ranked standing per entity.
//!
//! The two engines aggregate differently and must stay that way:
//!   - time:   peak resonance. The single best pair decides; a peak of
//!             exactly 100 is a perfect-resonance exemption (rank 1.0).
//!             Otherwise peak/100, under-sampling penalty when the entity
//!             has too few pairs, then capped below perfection.
//!   - pillar: plain arithmetic mean of every pair touching the entity.
//!
//! Entries are a pure projection of the match rows: no partial updates,
//! rebuilt wholesale on every run.

use crate::{
    cancel::CancelToken,
    config::LeaderboardConfig,
    error::ResonanceResult,
    matcher::{EngineType, MatchResult},
    types::EntityId,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub entity_id:      EntityId,
    pub engine_type:    EngineType,
    pub match_count:    usize,
    pub verified_count: u32,
    pub rank_score:     f64,
    pub display_score:  f64,
    pub rank:           usize,
}

// ── Aggregation policies ─────────────────────────────────────────────────────

/// Turns an entity's pairwise raw scores (0..=100) into a rank score (0..=1).
pub trait AggregationPolicy: Send + Sync {
    fn rank_score(&self, scores: &[f64]) -> f64;
}

/// Time engine: best single pair wins.
pub struct PeakResonance {
    min_sample_size:     usize,
    under_sample_factor: f64,
    near_perfect_cap:    f64,
}

impl AggregationPolicy for PeakResonance {
    fn rank_score(&self, scores: &[f64]) -> f64 {
        let peak = scores.iter().copied().fold(0.0_f64, f64::max);
        if peak >= 100.0 {
            return 1.0;
        }
        let mut score = peak / 100.0;
        if scores.len() < self.min_sample_size {
            score *= self.under_sample_factor;
        }
        score.min(self.near_perfect_cap)
    }
}

/// Pillar engine: arithmetic mean, no exemption.
pub struct MeanResonance;

impl AggregationPolicy for MeanResonance {
    fn rank_score(&self, scores: &[f64]) -> f64 {
        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().sum::<f64>() / scores.len() as f64 / 100.0
    }
}

/// The single dispatch point from engine type to aggregation semantics.
pub fn policy_for(engine: EngineType, config: &LeaderboardConfig) -> Box<dyn AggregationPolicy> {
    match engine {
        EngineType::Time => Box::new(PeakResonance {
            min_sample_size:     config.min_sample_size,
            under_sample_factor: config.under_sample_factor,
            near_perfect_cap:    config.near_perfect_cap,
        }),
        EngineType::Pillar => Box::new(MeanResonance),
    }
}

// ── Aggregator ───────────────────────────────────────────────────────────────

pub struct LeaderboardAggregator {
    config: LeaderboardConfig,
}

impl LeaderboardAggregator {
    pub fn new(config: LeaderboardConfig) -> Self {
        Self { config }
    }

    /// Build the full ranked leaderboard for one engine.
    ///
    /// Rows of other engines are ignored. `exclude` drops one entity from
    /// the output without touching anyone else's score. `verified` carries
    /// the externally confirmed pair counts.
    ///
    /// `rank` is the 1-based list position. Entries tied on both rank
    /// score and match count still get distinct ranks, ordered by id.
    pub fn aggregate(
        &self,
        engine: EngineType,
        rows: &[MatchResult],
        exclude: Option<&str>,
        verified: &HashMap<EntityId, u32>,
        cancel: &CancelToken,
    ) -> ResonanceResult<Vec<LeaderboardEntry>> {
        let per_entity = group_scores(engine, rows);
        if per_entity.is_empty() {
            return Ok(Vec::new());
        }

        let policy = policy_for(engine, &self.config);
        let groups: Vec<(&EntityId, &Vec<f64>)> = per_entity
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != exclude)
            .collect();
        let chunk = groups.len().div_ceil(self.config.partitions.max(1)).max(1);

        let partitions: Vec<Vec<LeaderboardEntry>> = groups
            .par_chunks(chunk)
            .map(|part| -> ResonanceResult<Vec<LeaderboardEntry>> {
                cancel.check()?;
                Ok(part
                    .iter()
                    .map(|(id, scores)| {
                        let rank_score = policy.rank_score(scores);
                        LeaderboardEntry {
                            entity_id: (*id).clone(),
                            engine_type: engine,
                            match_count: scores.len(),
                            verified_count: verified.get(*id).copied().unwrap_or(0),
                            rank_score,
                            display_score: rank_score * 100.0,
                            rank: 0,
                        }
                    })
                    .collect())
            })
            .collect::<ResonanceResult<_>>()?;

        let mut entries: Vec<LeaderboardEntry> = partitions.into_iter().flatten().collect();
        entries.sort_by(|a, b| {
            b.rank_score
                .total_cmp(&a.rank_score)
                .then(b.match_count.cmp(&a.match_count))
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        Ok(entries)
    }
}

/// Deduplicate to one row per unordered pair (latest `computed_at` wins,
/// later input wins on equal timestamps), then collect each entity's
/// scores. Entities come out in id order.
fn group_scores(engine: EngineType, rows: &[MatchResult]) -> BTreeMap<EntityId, Vec<f64>> {
    let mut latest: BTreeMap<(EntityId, EntityId), &MatchResult> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.engine_type == engine) {
        if row.subject_id == row.candidate_id {
            continue;
        }
        latest
            .entry(row.pair())
            .and_modify(|cur| {
                if row.computed_at >= cur.computed_at {
                    *cur = row;
                }
            })
            .or_insert(row);
    }

    let mut per_entity: BTreeMap<EntityId, Vec<f64>> = BTreeMap::new();
    for ((a, b), row) in latest {
        per_entity.entry(a).or_default().push(row.raw_score);
        per_entity.entry(b).or_default().push(row.raw_score);
    }
    per_entity
}
