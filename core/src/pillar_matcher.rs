//! Pillar matcher — four-tier nested equality over (year, month, day, hour).
//!
//! A tier is credited only when every shallower tier matches too, so a
//! day-pillar match under a year-pillar mismatch scores 0. Scores come
//! from `PillarScoreTable`: 0 / 20 / 40 / 70 / 100.
//!
//! The two auxiliary flags (shared elements, shared branches) never move
//! the score. At full identity they hold trivially and are reported with
//! `FlagSource::ImpliedByIdentity`; at every other tier they are computed.

use crate::{
    config::PillarScoreTable,
    error::ResonanceResult,
    matcher::{EngineType, Matcher, PairScore},
    pillar::PillarSet,
    types::EntityId,
};
use serde::{Deserialize, Serialize};

/// Deepest nested tier reached by a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PillarTier {
    Unmatched,
    Year,
    YearMonth,
    YearMonthDay,
    Full,
}

impl PillarTier {
    pub fn from_depth(depth: usize) -> Self {
        match depth {
            0 => Self::Unmatched,
            1 => Self::Year,
            2 => Self::YearMonth,
            3 => Self::YearMonthDay,
            _ => Self::Full,
        }
    }

    pub fn score(self, table: &PillarScoreTable) -> f64 {
        match self {
            Self::Unmatched    => 0.0,
            Self::Year         => table.year,
            Self::YearMonth    => table.year_month,
            Self::YearMonthDay => table.year_month_day,
            Self::Full         => table.full,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    Computed,
    ImpliedByIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxFlag {
    pub satisfied: bool,
    pub source:    FlagSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarComparison {
    pub tier:            PillarTier,
    pub raw_score:       f64,
    pub shared_elements: AuxFlag,
    pub shared_branches: AuxFlag,
}

impl PillarComparison {
    /// Tier names plus any satisfied auxiliary flag, for `matched_levels`.
    pub fn matched_levels(&self) -> Vec<String> {
        let mut levels: Vec<String> = PILLAR_LEVELS[..self.depth()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if self.shared_elements.satisfied {
            levels.push("elements".into());
        }
        if self.shared_branches.satisfied {
            levels.push("branches".into());
        }
        levels
    }

    fn depth(&self) -> usize {
        self.tier as usize
    }
}

const PILLAR_LEVELS: [&str; 4] = ["year_pillar", "month_pillar", "day_pillar", "hour_pillar"];

#[derive(Debug, Clone, PartialEq)]
pub struct PillarCandidate {
    pub entity_id:  EntityId,
    pub comparison: PillarComparison,
}

pub struct PillarMatcher {
    scores: PillarScoreTable,
}

impl PillarMatcher {
    pub fn new(scores: PillarScoreTable) -> Self {
        Self { scores }
    }

    pub fn compare(&self, a: &PillarSet, b: &PillarSet) -> PillarComparison {
        let depth = a
            .as_array()
            .iter()
            .zip(b.as_array().iter())
            .take_while(|(x, y)| x == y)
            .count();
        let tier = PillarTier::from_depth(depth);

        let (shared_elements, shared_branches) = if tier == PillarTier::Full {
            let implied = AuxFlag { satisfied: true, source: FlagSource::ImpliedByIdentity };
            (implied, implied)
        } else {
            (
                AuxFlag {
                    satisfied: a.element_profile() == b.element_profile(),
                    source:    FlagSource::Computed,
                },
                AuxFlag {
                    satisfied: a.branch_profile() == b.branch_profile(),
                    source:    FlagSource::Computed,
                },
            )
        };

        PillarComparison {
            tier,
            raw_score: tier.score(&self.scores),
            shared_elements,
            shared_branches,
        }
    }

    /// Compare `subject` against every other entity and keep those at or
    /// above `min_tier`; `PillarTier::Unmatched` keeps every comparison.
    /// Ordering: score desc, entity id asc.
    pub fn rank_candidates<'a, I>(
        &self,
        subject_id: &str,
        subject: &PillarSet,
        min_tier: PillarTier,
        population: I,
    ) -> Vec<PillarCandidate>
    where
        I: IntoIterator<Item = (&'a str, &'a PillarSet)>,
    {
        let mut pool: Vec<PillarCandidate> = population
            .into_iter()
            .filter(|(id, _)| *id != subject_id)
            .map(|(id, set)| PillarCandidate {
                entity_id:  id.to_string(),
                comparison: self.compare(subject, set),
            })
            .filter(|c| c.comparison.tier >= min_tier)
            .collect();

        pool.sort_by(|a, b| {
            b.comparison
                .raw_score
                .total_cmp(&a.comparison.raw_score)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        pool
    }
}

impl Matcher for PillarMatcher {
    type Profile = PillarSet;

    fn engine_type(&self) -> EngineType {
        EngineType::Pillar
    }

    /// `PillarSet` values are validated at parse time.
    fn check(&self, _entity_id: &str, _profile: &PillarSet) -> ResonanceResult<()> {
        Ok(())
    }

    fn score(&self, subject: &PillarSet, candidate: &PillarSet) -> Option<PairScore> {
        let comparison = self.compare(subject, candidate);
        Some(PairScore {
            raw_score:      comparison.raw_score,
            matched_levels: comparison.matched_levels(),
        })
    }
}
