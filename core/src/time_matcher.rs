//! Time layer matcher — seven-level cascading equality filter.
//!
//! A candidate enters the pool for depth `d` only if it equals the subject
//! on each of the first `d` levels. Its score is then taken at its actual
//! matched depth: `100 − Σ penalty(level)` over every level below it,
//! floored at 0. Year is a gate: a year mismatch is never scored.
//!
//! Only a genuine seven-level identity can reach 100. Several distinct
//! entities with identical fingerprints each legitimately reach it.

use crate::{
    config::PenaltyTable,
    error::{ResonanceError, ResonanceResult},
    fingerprint::{TimeFingerprint, TimeLevel},
    matcher::{EngineType, Matcher, PairScore},
    types::EntityId,
};

pub const MAX_SCORE: f64 = 100.0;

/// A scored candidate with the proximity used as tie-break.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeCandidate {
    pub entity_id:       EntityId,
    pub score:           PairScore,
    pub minute_distance: i64,
}

pub struct TimeLayerMatcher {
    penalties: PenaltyTable,
}

impl TimeLayerMatcher {
    pub fn new(penalties: PenaltyTable) -> Self {
        Self { penalties }
    }

    pub fn penalties(&self) -> &PenaltyTable {
        &self.penalties
    }

    /// Check a requested depth lies in 1..=7.
    pub fn check_depth(depth: usize) -> ResonanceResult<()> {
        if (1..=TimeLevel::DEPTH).contains(&depth) {
            Ok(())
        } else {
            Err(ResonanceError::InvalidDepth { depth })
        }
    }

    /// Score for a pair whose leading `depth` levels match.
    pub fn score_for_depth(&self, depth: usize) -> Option<f64> {
        if depth == 0 {
            return None;
        }
        let penalty: f64 = TimeLevel::ORDER[depth.min(TimeLevel::DEPTH)..]
            .iter()
            .map(|level| self.penalties.penalty(*level))
            .sum();
        Some((MAX_SCORE - penalty).clamp(0.0, MAX_SCORE))
    }

    /// Select and rank the candidate pool for `subject` at `depth`.
    ///
    /// The subject itself is skipped by id. Every candidate is validated;
    /// the first malformed one aborts the query. Ordering: score desc,
    /// minute distance asc, entity id asc.
    pub fn rank_candidates<'a, I>(
        &self,
        subject_id: &str,
        subject: &TimeFingerprint,
        depth: usize,
        population: I,
    ) -> ResonanceResult<Vec<TimeCandidate>>
    where
        I: IntoIterator<Item = (&'a str, &'a TimeFingerprint)>,
    {
        Self::check_depth(depth)?;
        self.check(subject_id, subject)?;

        let mut pool = Vec::new();
        for (entity_id, candidate) in population {
            if entity_id == subject_id {
                continue;
            }
            self.check(entity_id, candidate)?;
            if subject.matched_depth(candidate) < depth {
                continue;
            }
            if let Some(score) = self.score(subject, candidate) {
                pool.push(TimeCandidate {
                    entity_id:       entity_id.to_string(),
                    score,
                    minute_distance: subject.minute_distance(candidate),
                });
            }
        }

        pool.sort_by(|a, b| {
            b.score
                .raw_score
                .total_cmp(&a.score.raw_score)
                .then(a.minute_distance.cmp(&b.minute_distance))
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        Ok(pool)
    }
}

impl Matcher for TimeLayerMatcher {
    type Profile = TimeFingerprint;

    fn engine_type(&self) -> EngineType {
        EngineType::Time
    }

    fn check(&self, entity_id: &str, profile: &TimeFingerprint) -> ResonanceResult<()> {
        profile.validate(entity_id)
    }

    fn score(&self, subject: &TimeFingerprint, candidate: &TimeFingerprint) -> Option<PairScore> {
        let depth = subject.matched_depth(candidate);
        let raw_score = self.score_for_depth(depth)?;
        Some(PairScore {
            raw_score,
            matched_levels: TimeLevel::ORDER[..depth]
                .iter()
                .map(|level| level.as_str().to_string())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_scores_are_monotonic() {
        let m = TimeLayerMatcher::new(PenaltyTable::default());
        let scores: Vec<f64> = (1..=7).filter_map(|d| m.score_for_depth(d)).collect();
        assert_eq!(scores, vec![0.0, 10.0, 30.0, 45.0, 65.0, 80.0, 100.0]);
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(m.score_for_depth(0), None);
    }

    #[test]
    fn depth_outside_range_is_rejected() {
        assert!(matches!(
            TimeLayerMatcher::check_depth(0),
            Err(ResonanceError::InvalidDepth { depth: 0 })
        ));
        assert!(TimeLayerMatcher::check_depth(8).is_err());
        assert!(TimeLayerMatcher::check_depth(7).is_ok());
    }
}
