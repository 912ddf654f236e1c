//! Matcher trait and the pairwise result record.
//!
//! RULE: every engine implements `Matcher`. Engine selection happens in
//! exactly one place, `EngineType`, never by comparing tag strings.

use crate::{
    error::{ResonanceError, ResonanceResult},
    types::{pair_key, EntityId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    Time,
    Pillar,
}

impl EngineType {
    pub const ALL: [EngineType; 2] = [EngineType::Time, EngineType::Pillar];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Time   => "time",
            Self::Pillar => "pillar",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = ResonanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time"   => Ok(Self::Time),
            "pillar" => Ok(Self::Pillar),
            other    => Err(ResonanceError::Other(anyhow::anyhow!("unknown engine type '{other}'"))),
        }
    }
}

/// Raw output of one pairwise comparison, before it is attached to ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub raw_score:      f64,
    /// Names of the matched levels, shallowest first.
    pub matched_levels: Vec<String>,
}

/// One persisted pairwise comparison. At most one row exists per
/// unordered pair per engine; recomputing overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub subject_id:     EntityId,
    pub candidate_id:   EntityId,
    pub engine_type:    EngineType,
    pub raw_score:      f64,
    pub matched_levels: Vec<String>,
    pub computed_at:    DateTime<Utc>,
}

impl MatchResult {
    pub fn new(
        subject_id: &str,
        candidate_id: &str,
        engine_type: EngineType,
        score: PairScore,
        computed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject_id:     subject_id.to_string(),
            candidate_id:   candidate_id.to_string(),
            engine_type,
            raw_score:      score.raw_score,
            matched_levels: score.matched_levels,
            computed_at,
        }
    }

    /// Order-independent identity of the pair this result describes.
    pub fn pair(&self) -> (EntityId, EntityId) {
        pair_key(&self.subject_id, &self.candidate_id)
    }

    pub fn touches(&self, entity_id: &str) -> bool {
        self.subject_id == entity_id || self.candidate_id == entity_id
    }
}

/// The contract every matching engine fulfils.
pub trait Matcher: Send + Sync {
    /// Per-entity data the engine compares.
    type Profile;

    fn engine_type(&self) -> EngineType;

    /// Validate one profile. Malformed input is reported, never repaired.
    fn check(&self, entity_id: &str, profile: &Self::Profile) -> ResonanceResult<()>;

    /// Score one pair. `None` means the pair is not eligible for a score
    /// at all, which is distinct from a score of zero.
    fn score(&self, subject: &Self::Profile, candidate: &Self::Profile) -> Option<PairScore>;
}
