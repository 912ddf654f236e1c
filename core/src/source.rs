//! Collaborator interfaces consumed by the matching core.
//!
//! RULE: the algorithms never talk to storage directly. Records come in
//! through `RecordSource`, labels and verification through `LabelSource`,
//! and every result goes out through `PersistenceSink`. `MatchStore`
//! implements all three over SQLite; any other backend may too.

use crate::{
    config::WeightVector,
    error::ResonanceResult,
    event::AuditEvent,
    fingerprint::{TimeFingerprint, TimeLevel},
    leaderboard::LeaderboardEntry,
    matcher::{EngineType, MatchResult},
    pillar::RawPillarSet,
    types::{EntityId, VersionId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Equality filter on the leading levels of a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerprintFilter {
    pub reference: TimeFingerprint,
    /// Number of leading levels that must equal `reference` (1..=7).
    pub depth:     usize,
}

impl FingerprintFilter {
    pub fn levels(&self) -> &'static [TimeLevel] {
        &TimeLevel::ORDER[..self.depth.min(TimeLevel::DEPTH)]
    }

    pub fn accepts(&self, candidate: &TimeFingerprint) -> bool {
        self.levels().iter().all(|l| self.reference.level_eq(candidate, *l))
    }
}

/// An externally supplied similarity label for one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairLabel {
    pub subject_id:       EntityId,
    pub candidate_id:     EntityId,
    pub is_known_similar: bool,
}

/// One accepted weight vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVersion {
    pub version_id:       VersionId,
    pub weights:          WeightVector,
    pub separation_score: f64,
    pub created_at:       DateTime<Utc>,
}

pub trait RecordSource {
    /// `None` when the entity has no fingerprint on record.
    fn get_fingerprint(&self, entity_id: &str) -> ResonanceResult<Option<TimeFingerprint>>;

    /// Every entity whose fingerprint passes `filter`, in id order.
    fn fingerprints_matching(
        &self,
        filter: &FingerprintFilter,
    ) -> ResonanceResult<Vec<(EntityId, TimeFingerprint)>>;

    /// Raw, unvalidated pillar labels.
    fn get_pillars(&self, entity_id: &str) -> ResonanceResult<Option<RawPillarSet>>;

    /// Raw pillar labels for every entity that has them, in id order.
    fn all_pillars(&self) -> ResonanceResult<Vec<(EntityId, RawPillarSet)>>;

    /// Externally computed parental-trait similarity (0..=100), if known.
    fn parental_similarity(&self, a: &str, b: &str) -> ResonanceResult<Option<f64>>;
}

pub trait LabelSource {
    fn labeled_pairs(&self) -> ResonanceResult<Vec<PairLabel>>;

    /// Independently confirmed pair counts per entity for one engine.
    fn verified_counts(&self, engine: EngineType) -> ResonanceResult<HashMap<EntityId, u32>>;
}

pub trait PersistenceSink {
    /// Insert or overwrite the row for this unordered pair and engine.
    fn upsert_match_result(&self, result: &MatchResult) -> ResonanceResult<()>;

    fn match_results(&self, engine: EngineType) -> ResonanceResult<Vec<MatchResult>>;

    /// Replace the whole stored leaderboard for one engine.
    fn replace_leaderboard(
        &self,
        engine: EngineType,
        entries: &[LeaderboardEntry],
    ) -> ResonanceResult<()>;

    fn leaderboard(&self, engine: EngineType) -> ResonanceResult<Vec<LeaderboardEntry>>;

    /// Store an accepted vector and return its new version id.
    fn insert_weight_version(
        &self,
        weights: &WeightVector,
        separation_score: f64,
        created_at: DateTime<Utc>,
    ) -> ResonanceResult<VersionId>;

    /// Most recent accepted version, if any.
    fn active_weight_version(&self) -> ResonanceResult<Option<WeightVersion>>;

    /// Append one event to the batch-job audit trail.
    fn append_audit(&self, job_id: &str, event: &AuditEvent) -> ResonanceResult<()>;
}
